//! Step registry: the dependency graph between pipeline steps.
//!
//! An edge runs from the producer of an artifact type to every step that
//! requires that type. The registry validates that this graph is acyclic and
//! fully producible, and resolves deterministic execution orders from it.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

use crate::errors::RegistryError;
use crate::workflow::artifacts::ArtifactType;
use crate::workflow::step::{StepDefinition, StepId};

#[derive(Debug, Clone)]
pub struct StepRegistry {
    /// Steps in registration order; the index is the tie-break key.
    steps: Vec<StepDefinition>,
    index_map: HashMap<StepId, usize>,
    /// Artifact type -> index of its single producing step.
    producers: HashMap<ArtifactType, usize>,
    vocabulary: BTreeSet<ArtifactType>,
    /// Types supplied from outside the graph (no producer needed).
    seeds: BTreeSet<ArtifactType>,
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StepRegistry {
    /// Registry accepting the whole artifact vocabulary.
    pub fn new() -> Self {
        Self::with_vocabulary(ArtifactType::ALL)
    }

    /// Registry accepting only the given artifact types.
    pub fn with_vocabulary(types: impl IntoIterator<Item = ArtifactType>) -> Self {
        Self {
            steps: Vec::new(),
            index_map: HashMap::new(),
            producers: HashMap::new(),
            vocabulary: types.into_iter().collect(),
            seeds: BTreeSet::new(),
        }
    }

    /// Declare a type as externally supplied so no step needs to produce it.
    pub fn declare_seed(&mut self, artifact: ArtifactType) {
        self.seeds.insert(artifact);
    }

    pub fn is_seed(&self, artifact: ArtifactType) -> bool {
        self.seeds.contains(&artifact)
    }

    pub fn register(&mut self, step: StepDefinition) -> Result<(), RegistryError> {
        if self.index_map.contains_key(&step.id) {
            return Err(RegistryError::DuplicateStep(step.id));
        }

        for artifact in step.requires.iter().chain(step.produces.iter()) {
            if !self.vocabulary.contains(artifact) {
                return Err(RegistryError::UnknownArtifactType {
                    step: step.id.to_string(),
                    artifact: artifact.to_string(),
                });
            }
        }

        for artifact in &step.produces {
            if let Some(&existing) = self.producers.get(artifact) {
                return Err(RegistryError::DuplicateProducer {
                    artifact: *artifact,
                    first: self.steps[existing].id,
                    second: step.id,
                });
            }
        }

        let idx = self.steps.len();
        for artifact in &step.produces {
            self.producers.insert(*artifact, idx);
        }
        self.index_map.insert(step.id, idx);
        self.steps.push(step);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// All steps in registration order.
    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn get(&self, id: StepId) -> Option<&StepDefinition> {
        self.index_map.get(&id).map(|&i| &self.steps[i])
    }

    /// Look up a step, failing with `UnknownStep` when it is not registered.
    pub fn step(&self, id: StepId) -> Result<&StepDefinition, RegistryError> {
        self.get(id)
            .ok_or_else(|| RegistryError::UnknownStep(id.to_string()))
    }

    pub fn get_mut(&mut self, id: StepId) -> Option<&mut StepDefinition> {
        self.index_map.get(&id).map(|&i| &mut self.steps[i])
    }

    pub fn producer_of(&self, artifact: ArtifactType) -> Option<StepId> {
        self.producers.get(&artifact).map(|&i| self.steps[i].id)
    }

    pub fn consumers_of(&self, artifact: ArtifactType) -> Vec<StepId> {
        self.steps
            .iter()
            .filter(|s| s.requires.contains(&artifact))
            .map(|s| s.id)
            .collect()
    }

    /// Indices of the steps that produce the inputs of step `idx`.
    fn upstream(&self, idx: usize) -> Vec<usize> {
        let mut deps: Vec<usize> = self.steps[idx]
            .requires
            .iter()
            .filter_map(|artifact| self.producers.get(artifact).copied())
            .collect();
        deps.sort_unstable();
        deps.dedup();
        deps
    }

    /// Check the whole graph for cycles and unproduced inputs.
    pub fn validate(&self) -> Result<(), RegistryError> {
        let all: Vec<usize> = (0..self.steps.len()).collect();
        self.topological_order(&all)?;

        for step in &self.steps {
            for artifact in &step.requires {
                if !self.producers.contains_key(artifact) && !self.seeds.contains(artifact) {
                    return Err(RegistryError::MissingProducer {
                        step: step.id,
                        artifact: *artifact,
                    });
                }
            }
        }
        Ok(())
    }

    /// Execution order for the targets and every step needed to produce their
    /// inputs, producers first. Ties are broken by registration order.
    pub fn resolve_order(&self, targets: &[StepId]) -> Result<Vec<StepId>, RegistryError> {
        let mut selected = vec![false; self.steps.len()];
        let mut stack = Vec::new();
        for target in targets {
            let idx = *self
                .index_map
                .get(target)
                .ok_or_else(|| RegistryError::UnknownStep(target.to_string()))?;
            stack.push(idx);
        }

        while let Some(idx) = stack.pop() {
            if selected[idx] {
                continue;
            }
            selected[idx] = true;
            stack.extend(self.upstream(idx).into_iter().filter(|&d| !selected[d]));
        }

        let nodes: Vec<usize> = selected
            .iter()
            .enumerate()
            .filter(|&(_, &s)| s)
            .map(|(i, _)| i)
            .collect();
        let order = self.topological_order(&nodes)?;
        Ok(order.into_iter().map(|i| self.steps[i].id).collect())
    }

    /// Direct and transitive producers of a step's inputs, in execution order.
    pub fn dependencies_of(&self, id: StepId) -> Result<Vec<StepId>, RegistryError> {
        let order = self.resolve_order(&[id])?;
        Ok(order.into_iter().filter(|s| *s != id).collect())
    }

    /// Kahn's algorithm over the induced subgraph on `nodes`, always taking
    /// the ready node with the lowest registration index.
    fn topological_order(&self, nodes: &[usize]) -> Result<Vec<usize>, RegistryError> {
        let mut member = vec![false; self.steps.len()];
        for &n in nodes {
            member[n] = true;
        }

        let mut in_degree = vec![0usize; self.steps.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.steps.len()];
        for &n in nodes {
            for dep in self.upstream(n) {
                if member[dep] {
                    in_degree[n] += 1;
                    dependents[dep].push(n);
                }
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = nodes
            .iter()
            .filter(|&&n| in_degree[n] == 0)
            .map(|&n| Reverse(n))
            .collect();

        let mut order = Vec::with_capacity(nodes.len());
        while let Some(Reverse(node)) = ready.pop() {
            order.push(node);
            for &dependent in &dependents[node] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        if order.len() != nodes.len() {
            // The leftovers also include steps that merely sit downstream of a
            // cycle; report only those that can reach themselves.
            let residual: Vec<bool> = (0..self.steps.len()).map(|n| member[n] && in_degree[n] > 0).collect();
            let steps = nodes
                .iter()
                .filter(|&&n| residual[n] && reaches_itself(n, &residual, &dependents))
                .map(|&n| self.steps[n].id)
                .collect();
            return Err(RegistryError::Cycle { steps });
        }

        Ok(order)
    }
}

/// Depth-first walk from `start` along `dependents`, staying inside `residual`.
fn reaches_itself(start: usize, residual: &[bool], dependents: &[Vec<usize>]) -> bool {
    let mut seen = vec![false; residual.len()];
    let mut stack: Vec<usize> = dependents[start].clone();
    while let Some(node) = stack.pop() {
        if node == start {
            return true;
        }
        if !residual[node] || seen[node] {
            continue;
        }
        seen[node] = true;
        stack.extend(dependents[node].iter().copied());
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use ArtifactType as A;

    fn step(id: StepId, requires: &[ArtifactType], produces: &[ArtifactType]) -> StepDefinition {
        StepDefinition::new(id)
            .requires(requires.iter().copied())
            .produces(produces.iter().copied())
    }

    fn linear() -> StepRegistry {
        let mut reg = StepRegistry::new();
        reg.register(step(StepId::FetchIssue, &[], &[A::Issue])).unwrap();
        reg.register(step(StepId::Classify, &[A::Issue], &[A::Classification])).unwrap();
        reg.register(step(StepId::Plan, &[A::Classification], &[A::Plan])).unwrap();
        reg.register(step(StepId::Implement, &[A::Plan], &[A::Implementation])).unwrap();
        reg
    }

    #[test]
    fn test_linear_chain_resolves_in_order() {
        let reg = linear();
        reg.validate().unwrap();
        assert_eq!(
            reg.resolve_order(&[StepId::Implement]).unwrap(),
            vec![StepId::FetchIssue, StepId::Classify, StepId::Plan, StepId::Implement]
        );
    }

    #[test]
    fn test_resolve_only_includes_needed_steps() {
        let reg = linear();
        assert_eq!(
            reg.resolve_order(&[StepId::Classify]).unwrap(),
            vec![StepId::FetchIssue, StepId::Classify]
        );
    }

    #[test]
    fn test_ties_broken_by_registration_order() {
        let mut reg = StepRegistry::new();
        // Registered out of alphabetical order on purpose.
        reg.register(step(StepId::FetchPatch, &[], &[A::Patch])).unwrap();
        reg.register(step(StepId::FetchIssue, &[], &[A::Issue])).unwrap();
        reg.register(step(StepId::PatchPlan, &[A::Issue, A::Patch], &[A::PatchPlan])).unwrap();

        let order = reg.resolve_order(&[StepId::PatchPlan]).unwrap();
        assert_eq!(order, vec![StepId::FetchPatch, StepId::FetchIssue, StepId::PatchPlan]);
        // Stable across repeated calls.
        assert_eq!(reg.resolve_order(&[StepId::PatchPlan]).unwrap(), order);
    }

    #[test]
    fn test_each_step_appears_once_with_multiple_targets() {
        let mut reg = linear();
        reg.register(step(StepId::Review, &[A::Plan, A::Implementation], &[A::Review])).unwrap();

        let order = reg.resolve_order(&[StepId::Review, StepId::Implement, StepId::Plan]).unwrap();
        assert_eq!(order.len(), 5);
        let pos = |id| order.iter().position(|s| *s == id).unwrap();
        assert!(pos(StepId::Plan) < pos(StepId::Implement));
        assert!(pos(StepId::Implement) < pos(StepId::Review));
    }

    #[test]
    fn test_two_step_cycle_names_both() {
        let mut reg = StepRegistry::new();
        reg.register(step(StepId::Plan, &[A::Implementation], &[A::Plan])).unwrap();
        reg.register(step(StepId::Implement, &[A::Plan], &[A::Implementation])).unwrap();

        match reg.validate().unwrap_err() {
            RegistryError::Cycle { steps } => {
                assert!(steps.contains(&StepId::Plan));
                assert!(steps.contains(&StepId::Implement));
            }
            other => panic!("Expected Cycle, got {other:?}"),
        }
        assert!(matches!(
            reg.resolve_order(&[StepId::Implement]),
            Err(RegistryError::Cycle { .. })
        ));
    }

    #[test]
    fn test_cycle_report_excludes_downstream_steps() {
        let mut reg = StepRegistry::new();
        reg.register(step(StepId::FetchIssue, &[], &[A::Issue])).unwrap();
        reg.register(step(StepId::Plan, &[A::Issue, A::Implementation], &[A::Plan])).unwrap();
        reg.register(step(StepId::Implement, &[A::Plan], &[A::Implementation])).unwrap();
        // Blocked by the cycle, but not part of it.
        reg.register(step(StepId::Review, &[A::Implementation], &[A::Review])).unwrap();
        reg.register(step(StepId::AddressReview, &[A::Review], &[A::ReviewAddressed])).unwrap();

        match reg.validate().unwrap_err() {
            RegistryError::Cycle { steps } => assert_eq!(steps, vec![StepId::Plan, StepId::Implement]),
            other => panic!("Expected Cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let mut reg = StepRegistry::new();
        reg.register(step(StepId::Review, &[A::Review], &[A::Review])).unwrap();
        assert!(matches!(reg.validate(), Err(RegistryError::Cycle { .. })));
    }

    #[test]
    fn test_missing_producer() {
        let mut reg = StepRegistry::new();
        reg.register(step(StepId::Plan, &[A::Classification], &[A::Plan])).unwrap();
        match reg.validate().unwrap_err() {
            RegistryError::MissingProducer { step, artifact } => {
                assert_eq!(step, StepId::Plan);
                assert_eq!(artifact, A::Classification);
            }
            other => panic!("Expected MissingProducer, got {other:?}"),
        }
    }

    #[test]
    fn test_seed_satisfies_requirement() {
        let mut reg = StepRegistry::new();
        reg.declare_seed(A::Issue);
        reg.register(step(StepId::Classify, &[A::Issue], &[A::Classification])).unwrap();
        reg.validate().unwrap();
        assert!(reg.is_seed(A::Issue));
        assert_eq!(reg.resolve_order(&[StepId::Classify]).unwrap(), vec![StepId::Classify]);
    }

    #[test]
    fn test_duplicate_step_rejected() {
        let mut reg = linear();
        let err = reg.register(step(StepId::Plan, &[], &[])).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateStep(StepId::Plan)));
        assert_eq!(reg.len(), 4);
    }

    #[test]
    fn test_duplicate_producer_rejected() {
        let mut reg = linear();
        let err = reg.register(step(StepId::Review, &[], &[A::Plan])).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::DuplicateProducer { artifact: A::Plan, first: StepId::Plan, second: StepId::Review }
        ));
    }

    #[test]
    fn test_unknown_artifact_type_rejected() {
        let mut reg = StepRegistry::with_vocabulary([A::Issue, A::Classification]);
        let err = reg.register(step(StepId::Plan, &[A::Issue], &[A::Plan])).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownArtifactType { ref artifact, .. } if artifact == "plan"));
    }

    #[test]
    fn test_unknown_target_step() {
        let reg = linear();
        assert!(matches!(
            reg.resolve_order(&[StepId::Review]),
            Err(RegistryError::UnknownStep(ref name)) if name == "review"
        ));
    }

    #[test]
    fn test_dependencies_of_excludes_self() {
        let reg = linear();
        assert_eq!(
            reg.dependencies_of(StepId::Plan).unwrap(),
            vec![StepId::FetchIssue, StepId::Classify]
        );
        assert!(reg.dependencies_of(StepId::FetchIssue).unwrap().is_empty());
    }

    #[test]
    fn test_introspection() {
        let reg = linear();
        assert_eq!(reg.producer_of(A::Plan), Some(StepId::Plan));
        assert_eq!(reg.producer_of(A::Review), None);
        assert_eq!(reg.consumers_of(A::Issue), vec![StepId::Classify]);
        assert_eq!(reg.steps()[0].id, StepId::FetchIssue);
    }

    #[test]
    fn test_empty_registry_validates() {
        let reg = StepRegistry::new();
        assert!(reg.is_empty());
        reg.validate().unwrap();
        assert!(reg.resolve_order(&[]).unwrap().is_empty());
    }
}
