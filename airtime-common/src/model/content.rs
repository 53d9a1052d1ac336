//! Content model
//!
//! Content is a closed sum over the four kinds the platform stores. Writers
//! dispatch over the kind with an exhaustive match; there is no open visitor
//! hierarchy.

use serde::{Deserialize, Serialize};

use super::{Broadcast, Id, Source};

/// Top-level container (a programme).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brand {
    pub id: Id,
    pub source: Source,
    pub title: String,
    pub actively_published: bool,
}

/// A run of episodes within a brand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
    pub id: Id,
    pub source: Source,
    pub title: String,
    pub brand: Option<Id>,
    pub actively_published: bool,
}

/// A transmittable piece of content. Episodes embed one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: Id,
    pub source: Source,
    pub title: String,
    pub broadcasts: Vec<Broadcast>,
    pub actively_published: bool,
}

impl Item {
    pub fn new(id: Id, source: Source, title: impl Into<String>) -> Self {
        Self {
            id,
            source,
            title: title.into(),
            broadcasts: Vec::new(),
            actively_published: true,
        }
    }

    /// Copy of this item carrying only the given broadcast.
    pub fn with_single_broadcast(&self, broadcast: Broadcast) -> Item {
        let mut copy = self.clone();
        copy.broadcasts = vec![broadcast];
        copy
    }

    /// Broadcasts currently visible in resolved output.
    pub fn active_broadcasts(&self) -> impl Iterator<Item = &Broadcast> {
        self.broadcasts.iter().filter(|b| b.actively_published)
    }
}

/// An item that belongs to a series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    #[serde(flatten)]
    pub item: Item,
    pub series: Option<Id>,
    pub episode_number: Option<u32>,
}

/// The closed set of content kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Content {
    Brand(Brand),
    Series(Series),
    Episode(Episode),
    Item(Item),
}

impl Content {
    pub fn id(&self) -> Id {
        match self {
            Content::Brand(b) => b.id,
            Content::Series(s) => s.id,
            Content::Episode(e) => e.item.id,
            Content::Item(i) => i.id,
        }
    }

    pub fn source(&self) -> &Source {
        match self {
            Content::Brand(b) => &b.source,
            Content::Series(s) => &s.source,
            Content::Episode(e) => &e.item.source,
            Content::Item(i) => &i.source,
        }
    }

    /// The scheduleable item inside this content, if it is one.
    pub fn item(&self) -> Option<&Item> {
        match self {
            Content::Episode(e) => Some(&e.item),
            Content::Item(i) => Some(i),
            Content::Brand(_) | Content::Series(_) => None,
        }
    }

    pub fn into_item(self) -> Option<Item> {
        match self {
            Content::Episode(e) => Some(e.item),
            Content::Item(i) => Some(i),
            Content::Brand(_) | Content::Series(_) => None,
        }
    }
}

impl From<Item> for Content {
    fn from(item: Item) -> Self {
        Content::Item(item)
    }
}
