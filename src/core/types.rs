use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use chrono::NaiveDateTime;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use crate::core::error::{Error, Result};
use crate::core::utils::{natural_cmp, timestamp};

/// Identity of a catalog entry: `{family}-{shard}-{seq:03}`.
///
/// `shard` names the mother shard file holding the record, so a lookup
/// never needs an index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MotherId {
    pub family: String,
    pub shard: u32,
    pub seq: u32,
}

impl MotherId {
    pub fn new(family: impl Into<String>, shard: u32, seq: u32) -> Self {
        MotherId {
            family: family.into(),
            shard,
            seq,
        }
    }

    /// Position `ordinal` (1-based) in a store whose shards hold
    /// `capacity` records each.
    pub fn from_ordinal(family: &str, ordinal: usize, capacity: usize) -> Self {
        let zero_based = ordinal.saturating_sub(1);
        MotherId::new(
            family,
            (zero_based / capacity + 1) as u32,
            (zero_based % capacity + 1) as u32,
        )
    }

    pub fn copy_id(&self, number: u32) -> CopyId {
        CopyId {
            mother: self.clone(),
            number,
        }
    }

    /// IDs of copies `1..=quantity`.
    pub fn copy_ids(&self, quantity: u32) -> Vec<CopyId> {
        (1..=quantity).map(|n| self.copy_id(n)).collect()
    }
}

impl fmt::Display for MotherId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-{}-{:03}", self.family, self.shard, self.seq)
    }
}

impl FromStr for MotherId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('-').collect();
        if parts.len() != 3 || parts[0].is_empty() {
            return Err(Error::not_found(format!("malformed mother id {:?}", s)));
        }
        let shard = parse_positive(parts[1], s)?;
        let seq = parse_positive(parts[2], s)?;
        Ok(MotherId::new(parts[0], shard, seq))
    }
}

impl Ord for MotherId {
    fn cmp(&self, other: &Self) -> Ordering {
        natural_cmp(&self.family, &other.family)
            .then(self.shard.cmp(&other.shard))
            .then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for MotherId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Identity of one physical unit: `{mother_id}-{k}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CopyId {
    pub mother: MotherId,
    pub number: u32,
}

impl CopyId {
    pub fn mother_id(&self) -> &MotherId {
        &self.mother
    }
}

impl fmt::Display for CopyId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-{}", self.mother, self.number)
    }
}

impl FromStr for CopyId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (mother, number) = s
            .rsplit_once('-')
            .ok_or_else(|| Error::not_found(format!("malformed copy id {:?}", s)))?;
        let mother: MotherId = mother
            .parse()
            .map_err(|_| Error::not_found(format!("malformed copy id {:?}", s)))?;
        let number = parse_positive(number, s)?;
        Ok(CopyId { mother, number })
    }
}

impl Ord for CopyId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.mother
            .cmp(&other.mother)
            .then(self.number.cmp(&other.number))
    }
}

impl PartialOrd for CopyId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn parse_positive(segment: &str, id: &str) -> Result<u32> {
    match segment.parse::<u32>() {
        Ok(value) if value > 0 && segment.bytes().all(|b| b.is_ascii_digit()) => Ok(value),
        _ => Err(Error::not_found(format!("malformed id {:?}", id))),
    }
}

/// A key of a shard file.
///
/// Both ID types travel through JSON as plain strings, so they serve as
/// object keys as well as values.
pub trait RecordKey:
    Ord + Clone + fmt::Display + FromStr<Err = Error> + Send + Sync + 'static
{
    /// The mother record this key belongs to.
    fn owner(&self) -> &MotherId;

    /// Position the key occupies in its shard, for keys that number their
    /// own slots.
    fn slot(&self) -> Option<u32> {
        None
    }
}

impl RecordKey for MotherId {
    fn owner(&self) -> &MotherId {
        self
    }

    fn slot(&self) -> Option<u32> {
        Some(self.seq)
    }
}

impl RecordKey for CopyId {
    fn owner(&self) -> &MotherId {
        &self.mother
    }
}

macro_rules! string_serde {
    ($ty:ty, $expecting:literal) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                struct IdVisitor;

                impl<'de> Visitor<'de> for IdVisitor {
                    type Value = $ty;

                    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                        f.write_str($expecting)
                    }

                    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<$ty, E> {
                        v.parse().map_err(|e: Error| E::custom(e.context))
                    }
                }

                deserializer.deserialize_str(IdVisitor)
            }
        }
    };
}

string_serde!(MotherId, "a mother id like 1-3-010");
string_serde!(CopyId, "a copy id like 1-3-010-2");

/// Catalog entry as stored in `book-{N}.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotherRecord {
    #[serde(rename = "name", default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(rename = "isbn", default)]
    pub catalog_code: String,
    #[serde(default)]
    pub pages: String,
    #[serde(default)]
    pub words: String,
    #[serde(default)]
    pub category: String,
    #[serde(rename = "date_added", with = "timestamp", default)]
    pub created_at: NaiveDateTime,
    /// Denormalized list of owned copies. Copy shards stay authoritative.
    #[serde(default)]
    pub copies: Vec<CopyId>,
}

/// Input of a single-record add.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub publisher: String,
    pub catalog_code: String,
    pub pages: String,
    pub words: String,
    pub category: String,
}

impl NewBook {
    pub fn new(title: impl Into<String>, author: impl Into<String>) -> Self {
        NewBook {
            title: title.into(),
            author: author.into(),
            ..Default::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publisher = publisher.into();
        self
    }

    pub fn into_record(self, created_at: NaiveDateTime, copies: Vec<CopyId>) -> MotherRecord {
        MotherRecord {
            title: self.title,
            author: self.author,
            publisher: self.publisher,
            catalog_code: self.catalog_code,
            pages: self.pages,
            words: self.words,
            category: self.category,
            created_at,
            copies,
        }
    }
}

/// Parse a user-supplied copy quantity.
pub fn parse_quantity(text: &str) -> Result<u32> {
    let value: i64 = text
        .trim()
        .parse()
        .map_err(|_| Error::validation(format!("quantity {:?} is not a number", text)))?;
    if value <= 0 {
        return Err(Error::validation(format!("quantity must be positive, got {}", value)));
    }
    u32::try_from(value).map_err(|_| Error::validation(format!("quantity {} is too large", value)))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CopyStatus {
    Normal,
    Loaned,
    Lost,
    Damaged,
    Withdrawn,
    Other(String),
}

impl CopyStatus {
    /// On-disk spelling.
    pub fn as_str(&self) -> &str {
        match self {
            CopyStatus::Normal => "正常",
            CopyStatus::Loaned => "借出",
            CopyStatus::Lost => "丢失",
            CopyStatus::Damaged => "损坏",
            CopyStatus::Withdrawn => "下架",
            CopyStatus::Other(text) => text,
        }
    }

    pub fn parse(text: &str) -> Self {
        match text {
            "正常" => CopyStatus::Normal,
            "借出" => CopyStatus::Loaned,
            "丢失" => CopyStatus::Lost,
            "损坏" => CopyStatus::Damaged,
            "下架" => CopyStatus::Withdrawn,
            other => CopyStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for CopyStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for CopyStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CopyStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(CopyStatus::parse(&text))
    }
}

/// One physical unit as stored in `book-b-{N}.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopyRecord {
    #[serde(rename = "book_id")]
    pub mother_id: MotherId,
    pub status: CopyStatus,
    #[serde(default)]
    pub borrower_name: Option<String>,
    #[serde(rename = "borrow_date", with = "timestamp::option", default)]
    pub loaned_at: Option<NaiveDateTime>,
    #[serde(rename = "due_date", with = "timestamp::option", default)]
    pub due_at: Option<NaiveDateTime>,
    #[serde(rename = "notes", default)]
    pub note: Option<String>,
}

impl CopyRecord {
    pub fn new(mother_id: MotherId) -> Self {
        CopyRecord {
            mother_id,
            status: CopyStatus::Normal,
            borrower_name: None,
            loaned_at: None,
            due_at: None,
            note: None,
        }
    }

    pub fn with_status(mut self, status: CopyStatus) -> Self {
        self.status = status;
        self
    }

    pub fn loaned(
        mother_id: MotherId,
        borrower: impl Into<String>,
        loaned_at: NaiveDateTime,
        due_at: NaiveDateTime,
        note: Option<String>,
    ) -> Self {
        CopyRecord {
            mother_id,
            status: CopyStatus::Loaned,
            borrower_name: Some(borrower.into()),
            loaned_at: Some(loaned_at),
            due_at: Some(due_at),
            note,
        }
    }
}
