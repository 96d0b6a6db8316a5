//! The wire-adjacent data model: `InventoryRecord` (one metadump line) and
//! `McData` (a key descriptor carried from C8's filter stage through the
//! Key/Value Writer to the data file).

use crate::urlencode::url_decode;

/// One parsed line of the metadump stream:
/// `key=<urlenc> exp=<unix-ts-or-(-1)> la=<ts> cas=<n> fetch=<yes|no> cls=<n> size=<n>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InventoryRecord {
    /// URL-encoded key exactly as it appeared on the wire.
    pub raw_key: String,
    pub expiry: i64,
    pub last_access: i64,
    pub cas: u64,
    pub fetched: bool,
    pub slab_class: u32,
    pub size: u64,
}

impl InventoryRecord {
    /// Parses one metadump line (without its trailing `\r\n`/`\n`).
    pub fn parse(line: &str) -> Option<InventoryRecord> {
        let mut raw_key = None;
        let mut expiry = None;
        let mut last_access = None;
        let mut cas = None;
        let mut fetched = None;
        let mut slab_class = None;
        let mut size = None;

        for field in line.split_ascii_whitespace() {
            let (name, value) = field.split_once('=')?;
            match name {
                "key" => raw_key = Some(value.to_string()),
                "exp" => expiry = value.parse::<i64>().ok(),
                "la" => last_access = value.parse::<i64>().ok(),
                "cas" => cas = value.parse::<u64>().ok(),
                "fetch" => fetched = Some(value == "yes"),
                "cls" => slab_class = value.parse::<u32>().ok(),
                "size" => size = value.parse::<u64>().ok(),
                _ => {}
            }
        }

        Some(InventoryRecord {
            raw_key: raw_key?,
            expiry: expiry?,
            last_access: last_access.unwrap_or(0),
            cas: cas.unwrap_or(0),
            fetched: fetched.unwrap_or(false),
            slab_class: slab_class.unwrap_or(0),
            size: size.unwrap_or(0),
        })
    }

    /// The URL-decoded key, suitable for sending in a `get` command and for
    /// the `dest_ips` shard lookup.
    pub fn decoded_key(&self) -> String {
        url_decode(&self.raw_key)
    }
}

/// A key descriptor created when C8 reads an inventory line that passes
/// filters, carried through the bulk-get round trip until its record is
/// written (or discarded on miss).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct McData {
    pub key: String,
    pub expiry: i64,
    pub flags: u32,
    pub size: u64,
    pub value: Vec<u8>,
    pub complete: bool,
}

impl McData {
    pub fn from_inventory(record: &InventoryRecord) -> McData {
        McData {
            key: record.decoded_key(),
            expiry: record.expiry,
            flags: 0,
            size: 0,
            value: Vec::new(),
            complete: false,
        }
    }

    /// Formats this entry as one data-file record:
    /// `key=<urldecoded> exp=<decimal> flags=<decimal> size=<decimal> value=<size bytes verbatim>\n`.
    pub fn to_record_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.key.len() + self.value.len() + 32);
        out.extend_from_slice(b"key=");
        out.extend_from_slice(self.key.as_bytes());
        out.extend_from_slice(format!(" exp={} flags={} size={} value=", self.expiry, self.flags, self.size).as_bytes());
        out.extend_from_slice(&self.value);
        out.push(b'\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_line() {
        let line = "key=foo%20bar exp=1700000000 la=1690000000 cas=42 fetch=yes cls=3 size=10";
        let rec = InventoryRecord::parse(line).unwrap();
        assert_eq!(rec.raw_key, "foo%20bar");
        assert_eq!(rec.decoded_key(), "foo bar");
        assert_eq!(rec.expiry, 1_700_000_000);
        assert_eq!(rec.cas, 42);
        assert!(rec.fetched);
        assert_eq!(rec.slab_class, 3);
        assert_eq!(rec.size, 10);
    }

    #[test]
    fn negative_expiry_means_no_expiry() {
        let line = "key=abc exp=-1 la=0 cas=1 fetch=no cls=1 size=1";
        let rec = InventoryRecord::parse(line).unwrap();
        assert_eq!(rec.expiry, -1);
    }

    #[test]
    fn missing_key_is_none() {
        assert!(InventoryRecord::parse("exp=1 la=1 cas=1 fetch=no cls=1 size=1").is_none());
    }

    #[test]
    fn data_record_round_trip_shape() {
        let mc = McData {
            key: "a".into(),
            expiry: 100,
            flags: 0,
            size: 1,
            value: b"1".to_vec(),
            complete: true,
        };
        let bytes = mc.to_record_bytes();
        assert_eq!(bytes, b"key=a exp=100 flags=0 size=1 value=1\n");
    }
}
