use crate::{descriptor::Gender, error::CharaError};
use nohash_hasher::{IntMap, IntSet};
use serde::{Deserialize, Serialize};
use std::{fmt, io::Read, iter::FusedIterator, slice, str::FromStr};
use tracing::debug;

/// Race table shipped with the crate.
const BUILTIN_TABLE: &str = include_str!("races.json");

/// Highest race table version this crate understands.
pub const RACE_TABLE_VERSION: u32 = 1;

/// A race/gender/tribe variant, identified by its 4-digit code (e.g. `0101`).
///
/// The two leading digits encode race and gender, the trailing two the body variant.
/// This is a handle; everything else about the race lives in its [`RaceNode`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Race(u16);

impl nohash_hasher::IsEnabled for Race {}

impl Race {
    pub const fn from_code(code: u16) -> Self {
        Self(code)
    }

    pub fn code(self) -> u16 {
        self.0
    }

    pub fn gender(self) -> Gender {
        if (self.0 / 100) % 2 == 0 {
            Gender::Feminine
        } else {
            Gender::Masculine
        }
    }
}

impl FromStr for Race {
    type Err = CharaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 4 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CharaError::UnknownRace(s.into()));
        }
        s.parse::<u16>()
            .map(Race)
            .map_err(|_| CharaError::UnknownRace(s.into()))
    }
}

impl TryFrom<String> for Race {
    type Error = CharaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Race> for String {
    fn from(race: Race) -> Self {
        race.to_string()
    }
}

impl fmt::Display for Race {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

impl fmt::Debug for Race {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Race({:04})", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceTable {
    pub version: u32,
    pub races: Vec<RaceEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceEntry {
    pub name: Box<str>,
    pub code: Race,
    pub parent: Option<Race>,
    /// Race whose skin texture set this race uses: itself or one of its ancestors.
    pub skin: Race,
    /// Explicit model fallback order. Without it the ancestors are tried, nearest first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Vec<Race>>,
}

#[derive(Debug)]
pub struct RaceNode {
    pub race: Race,
    pub name: Box<str>,
    pub parent: Option<Race>,
    pub skin: Race,
    pub children: Vec<Race>,
    fallback: Option<Box<[Race]>>,
}

impl RaceNode {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn explicit_fallback(&self) -> Option<&[Race]> {
        self.fallback.as_deref()
    }
}

/// Parent/child forest of every known race, loaded once and read-only afterwards.
#[derive(Debug)]
pub struct RaceGraph {
    version: u32,
    nodes: IntMap<Race, RaceNode>,
    order: Vec<Race>,
}

impl RaceGraph {
    pub fn builtin() -> Result<Self, CharaError> {
        Self::from_json(BUILTIN_TABLE)
    }

    pub fn from_json(json: &str) -> Result<Self, CharaError> {
        let table: RaceTable = serde_json::from_str(json).map_err(CharaError::RaceTableParse)?;
        Self::from_table(table)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, CharaError> {
        let table: RaceTable =
            serde_json::from_reader(reader).map_err(CharaError::RaceTableParse)?;
        Self::from_table(table)
    }

    pub fn from_table(table: RaceTable) -> Result<Self, CharaError> {
        let invalid = |msg: String| CharaError::RaceTable(msg.into_boxed_str());

        if table.version == 0 || table.version > RACE_TABLE_VERSION {
            return Err(invalid(format!("unsupported version {}", table.version)));
        }

        let mut nodes = IntMap::with_capacity_and_hasher(table.races.len(), Default::default());
        let mut order = Vec::with_capacity(table.races.len());
        for entry in table.races {
            let node = RaceNode {
                race: entry.code,
                name: entry.name,
                parent: entry.parent,
                skin: entry.skin,
                children: Vec::new(),
                fallback: entry.fallback.map(Vec::into_boxed_slice),
            };
            if nodes.insert(entry.code, node).is_some() {
                return Err(invalid(format!("race {} is listed twice", entry.code)));
            }
            order.push(entry.code);
        }

        for race in &order {
            let node = &nodes[race];
            if let Some(parent) = node.parent {
                if !nodes.contains_key(&parent) {
                    return Err(invalid(format!("race {race} has unknown parent {parent}")));
                }
            }
            if !nodes.contains_key(&node.skin) {
                return Err(invalid(format!("race {race} has unknown skin race {}", node.skin)));
            }
        }

        // Any walk longer than the node count must have revisited a node.
        for race in &order {
            let mut current = nodes[race].parent;
            let mut hops = 0;
            while let Some(parent) = current {
                hops += 1;
                if hops > nodes.len() {
                    return Err(invalid(format!("race {race} is part of a parent cycle")));
                }
                current = nodes[&parent].parent;
            }
        }

        let graph_children: Vec<(Race, Race)> = order
            .iter()
            .filter_map(|race| nodes[race].parent.map(|parent| (parent, *race)))
            .collect();
        for (parent, child) in graph_children {
            if let Some(node) = nodes.get_mut(&parent) {
                node.children.push(child);
            }
        }

        let graph = Self {
            version: table.version,
            nodes,
            order,
        };

        for race in &graph.order {
            let node = &graph.nodes[race];
            if !graph.is_child_of(*race, node.skin) {
                return Err(invalid(format!(
                    "skin race {} of {race} is neither the race nor an ancestor",
                    node.skin
                )));
            }
            if let Some(fallback) = node.explicit_fallback() {
                let mut seen = IntSet::default();
                for candidate in fallback {
                    if *candidate == *race {
                        return Err(invalid(format!("race {race} lists itself as a fallback")));
                    }
                    if !graph.nodes.contains_key(candidate) {
                        return Err(invalid(format!(
                            "race {race} lists unknown fallback {candidate}"
                        )));
                    }
                    if !seen.insert(*candidate) {
                        return Err(invalid(format!(
                            "race {race} lists fallback {candidate} twice"
                        )));
                    }
                }
            }
        }

        debug!(version = graph.version, races = graph.order.len(), "race graph loaded");
        Ok(graph)
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// All nodes in table order.
    pub fn nodes(&self) -> impl Iterator<Item = &RaceNode> + '_ {
        self.order.iter().map(move |race| &self.nodes[race])
    }

    pub fn contains(&self, race: Race) -> bool {
        self.nodes.contains_key(&race)
    }

    pub fn node(&self, race: Race) -> Result<&RaceNode, CharaError> {
        self.nodes
            .get(&race)
            .ok_or_else(|| CharaError::UnknownRace(race.to_string().into_boxed_str()))
    }

    pub fn by_name(&self, name: &str) -> Option<Race> {
        self.nodes()
            .find(|node| node.name.eq_ignore_ascii_case(name))
            .map(|node| node.race)
    }

    pub fn name(&self, race: Race) -> &str {
        self.nodes.get(&race).map_or("Unknown", |node| &node.name)
    }

    pub fn parent(&self, race: Race) -> Option<Race> {
        self.nodes.get(&race).and_then(|node| node.parent)
    }

    pub fn is_direct_parent_of(&self, parent: Race, child: Race) -> bool {
        self.parent(child) == Some(parent)
    }

    /// True if `ancestor` is reached by walking parents from `candidate`, zero steps included.
    pub fn is_child_of(&self, candidate: Race, ancestor: Race) -> bool {
        self.contains(candidate)
            && (candidate == ancestor || self.ancestors(candidate).any(|race| race == ancestor))
    }

    /// Parent chain of `race`, nearest first, ending at its root.
    pub fn ancestors(&self, race: Race) -> Ancestors<'_> {
        Ancestors {
            graph: self,
            next: self.parent(race),
        }
    }

    pub fn depth(&self, race: Race) -> Result<usize, CharaError> {
        self.node(race)?;
        Ok(self.ancestors(race).count())
    }

    pub fn root_of(&self, race: Race) -> Result<Race, CharaError> {
        self.node(race)?;
        Ok(self.ancestors(race).last().unwrap_or(race))
    }

    pub fn skin_race(&self, race: Race) -> Result<Race, CharaError> {
        self.node(race).map(|node| node.skin)
    }

    /// Races to try once `race` itself yielded no model, in order.
    pub fn model_priority_list(&self, race: Race) -> Result<PriorityList<'_>, CharaError> {
        let node = self.node(race)?;
        Ok(match node.explicit_fallback() {
            Some(list) => PriorityList::Explicit(list.iter()),
            None => PriorityList::Ancestors(self.ancestors(race)),
        })
    }
}

pub struct Ancestors<'a> {
    graph: &'a RaceGraph,
    next: Option<Race>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = Race;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.graph.parent(current);
        Some(current)
    }
}

impl<'a> FusedIterator for Ancestors<'a> {}

pub enum PriorityList<'a> {
    Explicit(slice::Iter<'a, Race>),
    Ancestors(Ancestors<'a>),
}

impl<'a> Iterator for PriorityList<'a> {
    type Item = Race;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Explicit(iter) => iter.next().copied(),
            Self::Ancestors(iter) => iter.next(),
        }
    }
}

impl<'a> FusedIterator for PriorityList<'a> {}
