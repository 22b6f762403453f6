use std::collections::BTreeMap;
use std::ops::Bound;

use serde::{Deserialize, Serialize};

use super::stage::{Chain, Stage};
use super::{SceneId, SwitchTarget};

/// One routing configuration: a stage chain plus an optional init chain that
/// runs once each time the scene is entered.
pub struct Scene {
    id: SceneId,
    name: String,
    chain: Chain,
    init: Chain,
}

impl Scene {
    pub fn new(id: SceneId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            chain: Chain::new(),
            init: Chain::new(),
        }
    }

    /// Appends a stage to the processing chain.
    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.chain.push(stage);
        self
    }

    /// Appends a stage to the init chain.
    pub fn init(mut self, stage: impl Stage + 'static) -> Self {
        self.init.push(stage);
        self
    }

    #[inline]
    pub fn id(&self) -> SceneId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn chain_mut(&mut self) -> &mut Chain {
        &mut self.chain
    }

    pub fn init_chain_mut(&mut self) -> &mut Chain {
        &mut self.init
    }

    pub(crate) fn chains_mut(&mut self) -> (&mut Chain, &mut Chain) {
        (&mut self.chain, &mut self.init)
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("stages", &self.chain.len())
            .field("init_stages", &self.init.len())
            .finish()
    }
}

/// Ordered map of scenes, keyed by `(scene, subscene)`.
#[derive(Debug, Default)]
pub struct SceneTable {
    scenes: BTreeMap<SceneId, Scene>,
}

impl SceneTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `scene`, returning the scene it replaced.
    pub fn insert(&mut self, scene: Scene) -> Option<Scene> {
        self.scenes.insert(scene.id, scene)
    }

    #[inline]
    pub fn get(&self, id: SceneId) -> Option<&Scene> {
        self.scenes.get(&id)
    }

    #[inline]
    pub fn get_mut(&mut self, id: SceneId) -> Option<&mut Scene> {
        self.scenes.get_mut(&id)
    }

    #[inline]
    pub fn contains(&self, id: SceneId) -> bool {
        self.scenes.contains_key(&id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = SceneId> + '_ {
        self.scenes.keys().copied()
    }

    pub fn first(&self) -> Option<SceneId> {
        self.scenes.keys().next().copied()
    }

    fn first_of(&self, scene: u16) -> Option<SceneId> {
        self.scenes
            .range(SceneId::new(scene)..=SceneId::new(scene).with_subscene(u16::MAX))
            .next()
            .map(|(id, _)| *id)
    }

    /// Resolves `target` relative to `base`.
    ///
    /// Returns `None` if the target names a scene that does not exist. A relative
    /// target with no neighbour in that direction resolves to `base`.
    pub fn resolve(&self, target: SwitchTarget, base: SceneId) -> Option<SceneId> {
        match target {
            SwitchTarget::Exact(id) => self.contains(id).then_some(id),
            SwitchTarget::Scene(n) => self.first_of(n),
            SwitchTarget::Subscene(n) => {
                let id = SceneId::new(base.scene).with_subscene(n);
                self.contains(id).then_some(id)
            }
            SwitchTarget::NextScene => {
                let next = base
                    .scene
                    .checked_add(1)
                    .and_then(|n| self.scenes.range(SceneId::new(n)..).next())
                    .map(|(id, _)| *id);
                Some(next.unwrap_or(base))
            }
            SwitchTarget::PrevScene => {
                let prev = self
                    .scenes
                    .range(..SceneId::new(base.scene))
                    .next_back()
                    .and_then(|(id, _)| self.first_of(id.scene));
                Some(prev.unwrap_or(base))
            }
            SwitchTarget::NextSubscene => {
                let next = self
                    .scenes
                    .range((Bound::Excluded(base), Bound::Unbounded))
                    .next()
                    .map(|(id, _)| *id)
                    .filter(|id| id.scene == base.scene);
                Some(next.unwrap_or(base))
            }
            SwitchTarget::PrevSubscene => {
                let prev = self
                    .scenes
                    .range(..base)
                    .next_back()
                    .map(|(id, _)| *id)
                    .filter(|id| id.scene == base.scene);
                Some(prev.unwrap_or(base))
            }
        }
    }

    /// Ids and names, for non-RT readers. Allocates.
    pub fn summary(&self) -> SceneSummary {
        SceneSummary {
            entries: self
                .scenes
                .values()
                .map(|scene| SceneEntry {
                    id: scene.id,
                    name: scene.name.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneEntry {
    pub id: SceneId,
    pub name: String,
}

/// Snapshot of the scene table published to non-RT threads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneSummary {
    pub entries: Vec<SceneEntry>,
}

impl SceneSummary {
    pub fn name(&self, id: SceneId) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SceneTable {
        let mut table = SceneTable::new();
        for id in [
            SceneId::new(1),
            SceneId::new(2),
            SceneId::new(2).with_subscene(1),
            SceneId::new(2).with_subscene(2),
            SceneId::new(5).with_subscene(1),
        ] {
            table.insert(Scene::new(id, format!("scene {}", id)));
        }
        table
    }

    #[test]
    fn test_resolve_absolute() {
        let t = table();
        let base = SceneId::new(1);
        assert_eq!(t.resolve(SceneId::new(2).into(), base), Some(SceneId::new(2)));
        assert_eq!(t.resolve(SwitchTarget::Exact(SceneId::new(3)), base), None);
        assert_eq!(
            t.resolve(SwitchTarget::Scene(5), base),
            Some(SceneId::new(5).with_subscene(1))
        );
        assert_eq!(t.resolve(SwitchTarget::Scene(4), base), None);
        assert_eq!(t.resolve(SwitchTarget::Subscene(1), base), None);
        assert_eq!(
            t.resolve(SwitchTarget::Subscene(2), SceneId::new(2)),
            Some(SceneId::new(2).with_subscene(2))
        );
    }

    #[test]
    fn test_resolve_relative_scenes() {
        let t = table();
        let mid = SceneId::new(2).with_subscene(1);
        assert_eq!(
            t.resolve(SwitchTarget::NextScene, mid),
            Some(SceneId::new(5).with_subscene(1))
        );
        assert_eq!(t.resolve(SwitchTarget::PrevScene, mid), Some(SceneId::new(1)));
        assert_eq!(
            t.resolve(SwitchTarget::PrevScene, SceneId::new(5).with_subscene(1)),
            Some(SceneId::new(2))
        );
        // no neighbour: stays put
        assert_eq!(t.resolve(SwitchTarget::PrevScene, SceneId::new(1)), Some(SceneId::new(1)));
        let last = SceneId::new(5).with_subscene(1);
        assert_eq!(t.resolve(SwitchTarget::NextScene, last), Some(last));
    }

    #[test]
    fn test_resolve_relative_subscenes() {
        let t = table();
        let mid = SceneId::new(2).with_subscene(1);
        assert_eq!(
            t.resolve(SwitchTarget::NextSubscene, mid),
            Some(SceneId::new(2).with_subscene(2))
        );
        assert_eq!(t.resolve(SwitchTarget::PrevSubscene, mid), Some(SceneId::new(2)));
        assert_eq!(
            t.resolve(SwitchTarget::PrevSubscene, SceneId::new(2)),
            Some(SceneId::new(2))
        );
        let end = SceneId::new(2).with_subscene(2);
        assert_eq!(t.resolve(SwitchTarget::NextSubscene, end), Some(end));
    }

    #[test]
    fn test_summary() {
        let t = table();
        let summary = t.summary();
        assert_eq!(summary.len(), 5);
        assert_eq!(summary.name(SceneId::new(2).with_subscene(2)), Some("scene 2.2"));
        assert_eq!(summary.name(SceneId::new(9)), None);
    }
}
