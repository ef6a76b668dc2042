use crate::error::DirectoryError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named bucket of records of one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Craftsmen,
    Machines,
    Shops,
    Offers,
    Ads,
    News,
    Emergency,
}

impl Collection {
    pub const ALL: [Collection; 7] = [
        Collection::Craftsmen,
        Collection::Machines,
        Collection::Shops,
        Collection::Offers,
        Collection::Ads,
        Collection::News,
        Collection::Emergency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Craftsmen => "craftsmen",
            Collection::Machines => "machines",
            Collection::Shops => "shops",
            Collection::Offers => "offers",
            Collection::Ads => "ads",
            Collection::News => "news",
            Collection::Emergency => "emergency",
        }
    }

    /// Fields a new record must carry before any backend accepts it.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Collection::Craftsmen => &["name", "specialty", "phone"],
            Collection::Machines => &["name", "type", "phone"],
            Collection::Shops => &["name", "phone", "password"],
            Collection::Offers => &["title", "shop_id"],
            Collection::Ads => &["title", "description"],
            Collection::News => &["title", "content"],
            Collection::Emergency => &["name", "phone"],
        }
    }

    /// Offers and ads go through moderation before they are shown.
    pub fn is_approvable(&self) -> bool {
        matches!(self, Collection::Offers | Collection::Ads)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = DirectoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Collection::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| DirectoryError::Validation(format!("unknown collection '{}'", s.trim())))
    }
}
