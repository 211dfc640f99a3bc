//! 关节 ID 与位置集合

use jointflow_protocol::Normalized;
use std::collections::BTreeMap;
use std::fmt;

/// 关节 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct JointId(pub u16);

impl fmt::Display for JointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "joint{}", self.0)
    }
}

/// 关节 → 归一化位置
///
/// 按关节 ID 有序，迭代顺序确定。
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PositionMap(BTreeMap<JointId, Normalized>);

impl PositionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, joint: JointId, position: Normalized) -> Option<Normalized> {
        self.0.insert(joint, position)
    }

    pub fn get(&self, joint: JointId) -> Option<Normalized> {
        self.0.get(&joint).copied()
    }

    pub fn contains(&self, joint: JointId) -> bool {
        self.0.contains_key(&joint)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn joints(&self) -> impl Iterator<Item = JointId> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (JointId, Normalized)> + '_ {
        self.0.iter().map(|(j, p)| (*j, *p))
    }
}

impl FromIterator<(JointId, Normalized)> for PositionMap {
    fn from_iter<I: IntoIterator<Item = (JointId, Normalized)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for PositionMap {
    type Item = (JointId, Normalized);
    type IntoIter = std::collections::btree_map::IntoIter<JointId, Normalized>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl Extend<(JointId, Normalized)> for PositionMap {
    fn extend<I: IntoIterator<Item = (JointId, Normalized)>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}
