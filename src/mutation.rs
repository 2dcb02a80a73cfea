//! The mutation data model: a shared pool of immutable mutation records
//! referenced by compact 32-bit indices, with per-trait effect caches and
//! the fixation/loss lifecycle state machine.
//!
//! Identity is `mutation_id`, assigned from a monotonic counter and used
//! for serialization; pool indices are transient handles and may be
//! reused after a mutation is reclaimed. Illegal state transitions are
//! asserted, not tolerated: the transient `removed_with_substitution`
//! state exists precisely so tick-boundary fixation can be rolled back
//! atomically, and a wrong-direction move is a kernel bug.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

use crate::error::ScriptErrorKind;
use crate::object::{ObjectElement, ObjectRef, ObjectValue};
use crate::signature::{masks, Signature};
use crate::value::Value;

pub type MutationId = i64;
pub type MutationTypeId = i64;
pub type Tick = i64;

/// A compact handle into the mutation pool; `-1` is the null sentinel.
/// Signed so that running out of indices crashes hard instead of silently
/// corrupting genome runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MutationIndex(pub i32);

impl MutationIndex {
    pub const NULL: MutationIndex = MutationIndex(-1);

    pub fn is_null(self) -> bool {
        self.0 < 0
    }

    fn slot(self) -> usize {
        debug_assert!(!self.is_null());
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MutationState {
    New,
    InRegistry,
    RemovedWithSubstitution,
    FixedAndSubstituted,
    LostAndRemoved,
}

/// A dominance coefficient, or the distinguished "independent dominance"
/// marker meaning two heterozygous contributions equal one homozygous
/// contribution. The marker is a tag, never a magic float; scripts spell
/// it NAN, and the boundary converts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Dominance {
    Coefficient(f64),
    Independent,
}

impl Dominance {
    /// The coefficient used for a heterozygote: 0.5 under independence,
    /// so that two heterozygous contributions sum to one homozygous one.
    pub fn realized(self) -> f64 {
        match self {
            Dominance::Coefficient(h) => h,
            Dominance::Independent => 0.5,
        }
    }
}

/// How one mutation influences one trait: effect size, dominance, and the
/// cached fitness contributions. The caches are clamped to 0 so the core
/// fitness loop can multiply without testing for negative values.
#[derive(Debug, Clone, Serialize)]
pub struct MutationTraitInfo {
    effect_size: f64,
    dominance: Dominance,
    hemizygous_dominance: f64,
    homozygous_effect: f64,
    heterozygous_effect: f64,
    hemizygous_effect: f64,
}

impl MutationTraitInfo {
    fn new() -> Self {
        let mut info = Self {
            effect_size: 0.0,
            dominance: Dominance::Coefficient(1.0),
            hemizygous_dominance: 1.0,
            homozygous_effect: 1.0,
            heterozygous_effect: 1.0,
            hemizygous_effect: 1.0,
        };
        info.recache();
        info
    }

    fn recache(&mut self) {
        let s = self.effect_size;
        self.homozygous_effect = (1.0 + s).max(0.0);
        self.heterozygous_effect = (1.0 + self.dominance.realized() * s).max(0.0);
        self.hemizygous_effect = (1.0 + self.hemizygous_dominance * s).max(0.0);
    }

    pub fn effect_size(&self) -> f64 {
        self.effect_size
    }

    pub fn dominance(&self) -> Dominance {
        self.dominance
    }

    pub fn hemizygous_dominance(&self) -> f64 {
        self.hemizygous_dominance
    }

    pub fn homozygous_effect(&self) -> f64 {
        self.homozygous_effect
    }

    pub fn heterozygous_effect(&self) -> f64 {
        self.heterozygous_effect
    }

    pub fn hemizygous_effect(&self) -> f64 {
        self.hemizygous_effect
    }
}

/// An allelic change at a position, shared by reference across all the
/// genomes that carry it.
#[derive(Debug, Clone, Serialize)]
pub struct Mutation {
    pub mutation_id: MutationId,
    pub mutation_type: MutationTypeId,
    pub chromosome_index: u8,
    pub position: i64,
    pub origin_tick: Tick,
    pub subpop_of_origin: i64,
    /// A=0 C=1 G=2 T=3; -1 for non-nucleotide-based models.
    pub nucleotide: i8,
    pub state: MutationState,
    /// True iff the effect size is zero for every trait. Neutrality here
    /// means neutral for *all* traits, not only fitness-affecting ones.
    pub is_neutral: bool,
    pub is_independent_dominance: bool,
    pub tag: i64,
}

/// The process-wide pool. Mutations live in slot storage with a freelist;
/// the per-trait records live in a parallel pool with a fixed per-mutation
/// record count chosen at construction. Not safe for concurrent creation
/// from multiple threads.
pub struct MutationPool {
    slots: Vec<Option<Mutation>>,
    trait_info: Vec<MutationTraitInfo>,
    traits_per_mutation: usize,
    free_list: Vec<i32>,
    next_mutation_id: MutationId,
}

impl MutationPool {
    pub fn new(traits_per_mutation: usize) -> Self {
        assert!(traits_per_mutation >= 1, "MutationPool: at least one trait is required");
        Self {
            slots: Vec::new(),
            trait_info: Vec::new(),
            traits_per_mutation,
            free_list: Vec::new(),
            next_mutation_id: 0,
        }
    }

    pub fn traits_per_mutation(&self) -> usize {
        self.traits_per_mutation
    }

    /// Mutations currently occupying a slot (any state).
    pub fn live_count(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &mut self,
        mutation_type: MutationTypeId,
        chromosome_index: u8,
        position: i64,
        subpop_of_origin: i64,
        origin_tick: Tick,
        nucleotide: i8,
    ) -> MutationIndex {
        let mutation_id = self.next_mutation_id;
        self.next_mutation_id += 1;

        let mutation = Mutation {
            mutation_id,
            mutation_type,
            chromosome_index,
            position,
            origin_tick,
            subpop_of_origin,
            nucleotide,
            state: MutationState::New,
            is_neutral: true,
            is_independent_dominance: false,
            tag: 0,
        };

        match self.free_list.pop() {
            Some(slot) => {
                let idx = MutationIndex(slot);
                self.slots[idx.slot()] = Some(mutation);
                let base = idx.slot() * self.traits_per_mutation;
                for record in &mut self.trait_info[base..base + self.traits_per_mutation] {
                    *record = MutationTraitInfo::new();
                }
                idx
            }
            None => {
                let idx = MutationIndex(self.slots.len() as i32);
                self.slots.push(Some(mutation));
                self.trait_info
                    .extend((0..self.traits_per_mutation).map(|_| MutationTraitInfo::new()));
                idx
            }
        }
    }

    pub fn get(&self, idx: MutationIndex) -> &Mutation {
        self.slots[idx.slot()].as_ref().expect("MutationPool: access to a reclaimed slot")
    }

    pub fn get_mut(&mut self, idx: MutationIndex) -> &mut Mutation {
        self.slots[idx.slot()].as_mut().expect("MutationPool: access to a reclaimed slot")
    }

    fn trait_slot(&self, idx: MutationIndex, trait_index: usize) -> usize {
        assert!(
            trait_index < self.traits_per_mutation,
            "MutationPool: trait index {} out of range",
            trait_index
        );
        idx.slot() * self.traits_per_mutation + trait_index
    }

    pub fn trait_info(&self, idx: MutationIndex, trait_index: usize) -> &MutationTraitInfo {
        &self.trait_info[self.trait_slot(idx, trait_index)]
    }

    fn refresh_neutrality(&mut self, idx: MutationIndex) {
        let base = idx.slot() * self.traits_per_mutation;
        let neutral = self.trait_info[base..base + self.traits_per_mutation]
            .iter()
            .all(|info| info.effect_size == 0.0);
        self.get_mut(idx).is_neutral = neutral;
    }

    pub fn set_effect(&mut self, idx: MutationIndex, trait_index: usize, effect: f64) {
        let slot = self.trait_slot(idx, trait_index);
        let record = &mut self.trait_info[slot];
        record.effect_size = effect;
        record.recache();
        self.refresh_neutrality(idx);
    }

    /// Assigning [`Dominance::Independent`] is the only thing that turns
    /// the independent-dominance flag on; a coefficient that merely
    /// behaves like independence does not.
    pub fn set_dominance(&mut self, idx: MutationIndex, trait_index: usize, dominance: Dominance) {
        let slot = self.trait_slot(idx, trait_index);
        let record = &mut self.trait_info[slot];
        record.dominance = dominance;
        record.recache();

        let base = idx.slot() * self.traits_per_mutation;
        let independent = self.trait_info[base..base + self.traits_per_mutation]
            .iter()
            .any(|info| info.dominance == Dominance::Independent);
        self.get_mut(idx).is_independent_dominance = independent;
    }

    pub fn set_hemizygous_dominance(&mut self, idx: MutationIndex, trait_index: usize, h: f64) {
        let slot = self.trait_slot(idx, trait_index);
        let record = &mut self.trait_info[slot];
        record.hemizygous_dominance = h;
        record.recache();
    }

    /// The dominance used for a heterozygote, resolving the independent
    /// marker to 0.5.
    pub fn realized_dominance(&self, idx: MutationIndex, trait_index: usize) -> f64 {
        self.trait_info(idx, trait_index).dominance.realized()
    }

    // ----- lifecycle -----

    fn transition(&mut self, idx: MutationIndex, from: MutationState, to: MutationState) {
        let mutation = self.get_mut(idx);
        assert!(
            mutation.state == from,
            "MutationPool: illegal transition {:?} -> {:?} from state {:?}",
            from,
            to,
            mutation.state
        );
        mutation.state = to;
    }

    pub fn add_to_registry(&mut self, idx: MutationIndex) {
        self.transition(idx, MutationState::New, MutationState::InRegistry);
    }

    /// Begin the fixation sweep for this mutation; transient until either
    /// [`MutationPool::finish_substitution`] or
    /// [`MutationPool::restore_to_registry`] resolves it by tick-end.
    pub fn remove_with_substitution(&mut self, idx: MutationIndex) {
        self.transition(idx, MutationState::InRegistry, MutationState::RemovedWithSubstitution);
    }

    pub fn finish_substitution(&mut self, idx: MutationIndex) {
        self.transition(
            idx,
            MutationState::RemovedWithSubstitution,
            MutationState::FixedAndSubstituted,
        );
    }

    /// Roll back an aborted fixation sweep.
    pub fn restore_to_registry(&mut self, idx: MutationIndex) {
        self.transition(idx, MutationState::RemovedWithSubstitution, MutationState::InRegistry);
    }

    pub fn remove_as_lost(&mut self, idx: MutationIndex) {
        self.transition(idx, MutationState::InRegistry, MutationState::LostAndRemoved);
    }

    /// Return a finished mutation's slot to the freelist. Only legal once
    /// every reference has been dropped and the mutation has reached a
    /// terminal state.
    pub fn reclaim(&mut self, idx: MutationIndex) {
        let state = self.get(idx).state;
        assert!(
            matches!(
                state,
                MutationState::LostAndRemoved | MutationState::FixedAndSubstituted
            ),
            "MutationPool: reclaiming a mutation in state {:?}",
            state
        );
        self.slots[idx.slot()] = None;
        self.free_list.push(idx.0);
    }

    /// Serialize every slot-resident mutation by identity, for dumps.
    pub fn serialize_live(&self) -> serde_json::Result<String> {
        let live: Vec<&Mutation> = self.slots.iter().flatten().collect();
        serde_json::to_string(&live)
    }
}

pub type SharedMutationPool = Rc<RefCell<MutationPool>>;

/// Wrap a pool for sharing with script proxies.
pub fn shared_pool(pool: MutationPool) -> SharedMutationPool {
    Rc::new(RefCell::new(pool))
}

/// The script-side face of a pooled mutation: a lightweight handle
/// carrying the pool reference and index. Dropping proxies never touches
/// the pooled record.
pub struct MutationProxy {
    pool: SharedMutationPool,
    index: MutationIndex,
}

pub fn mutation_object(pool: &SharedMutationPool, index: MutationIndex) -> ObjectRef {
    Rc::new(RefCell::new(MutationProxy { pool: Rc::clone(pool), index }))
}

impl MutationProxy {
    fn trait_index(&self, args: &[Value]) -> Result<usize, ScriptErrorKind> {
        let idx = args[0].integer_at(0)?;
        let traits = self.pool.borrow().traits_per_mutation();
        if idx < 0 || idx as usize >= traits {
            return Err(ScriptErrorKind::TraitIndexOutOfRange(idx));
        }
        Ok(idx as usize)
    }
}

impl ObjectElement for MutationProxy {
    fn element_type(&self) -> &'static str {
        "Mutation"
    }

    fn identity(&self) -> u64 {
        self.index.0 as u64
    }

    fn read_only_members(&self) -> &'static [&'static str] {
        &[
            "id",
            "mutationType",
            "position",
            "originTick",
            "nucleotide",
            "isNeutral",
            "isIndependentDominance",
            "isFixed",
            "isSegregating",
        ]
    }

    fn read_write_members(&self) -> &'static [&'static str] {
        &["subpopID", "tag"]
    }

    fn get_member(&self, name: &str) -> Result<Value, ScriptErrorKind> {
        let pool = self.pool.borrow();
        let mutation = pool.get(self.index);
        match name {
            "id" => Ok(Value::integer(mutation.mutation_id)),
            "mutationType" => Ok(Value::integer(mutation.mutation_type)),
            "position" => Ok(Value::integer(mutation.position)),
            "originTick" => Ok(Value::integer(mutation.origin_tick)),
            "subpopID" => Ok(Value::integer(mutation.subpop_of_origin)),
            "nucleotide" => Ok(Value::integer(mutation.nucleotide as i64)),
            "tag" => Ok(Value::integer(mutation.tag)),
            "isNeutral" => Ok(Value::logical(mutation.is_neutral)),
            "isIndependentDominance" => Ok(Value::logical(mutation.is_independent_dominance)),
            "isFixed" => Ok(Value::logical(mutation.state == MutationState::FixedAndSubstituted)),
            "isSegregating" => Ok(Value::logical(mutation.state == MutationState::InRegistry)),
            _ => Err(self.unknown_member(name)),
        }
    }

    fn set_member(&mut self, name: &str, value: &Value) -> Result<(), ScriptErrorKind> {
        let mut pool = self.pool.borrow_mut();
        let mutation = pool.get_mut(self.index);
        match name {
            "subpopID" => {
                mutation.subpop_of_origin = value.integer_at(0)?;
                Ok(())
            }
            "tag" => {
                mutation.tag = value.integer_at(0)?;
                Ok(())
            }
            member if self.read_only_members().contains(&member) => {
                Err(ScriptErrorKind::ReadOnlyMember {
                    class: "Mutation".to_string(),
                    member: member.to_string(),
                })
            }
            _ => Err(self.unknown_member(name)),
        }
    }

    fn methods(&self) -> &'static [&'static str] {
        &[
            "effectForTrait",
            "dominanceForTrait",
            "hemizygousDominanceForTrait",
            "setEffectForTrait",
            "setDominanceForTrait",
            "setHemizygousDominanceForTrait",
        ]
    }

    fn method_signature(&self, name: &str) -> Option<Signature> {
        match name {
            "effectForTrait" | "dominanceForTrait" | "hemizygousDominanceForTrait" => Some(
                Signature::instance_method(name, masks::FLOAT | masks::SINGLETON)
                    .arg(masks::INT | masks::SINGLETON),
            ),
            "setEffectForTrait" | "setDominanceForTrait" | "setHemizygousDominanceForTrait" => {
                Some(
                    Signature::class_method(name, masks::NONE)
                        .arg(masks::INT | masks::SINGLETON)
                        .arg(masks::NUMERIC | masks::SINGLETON),
                )
            }
            _ => None,
        }
    }

    fn execute_instance_method(
        &self,
        name: &str,
        args: &[Value],
    ) -> Result<Value, ScriptErrorKind> {
        let trait_index = self.trait_index(args)?;
        match name {
            "effectForTrait" => {
                let pool = self.pool.borrow();
                Ok(Value::float(pool.trait_info(self.index, trait_index).effect_size()))
            }
            "dominanceForTrait" => {
                let pool = self.pool.borrow();
                Ok(Value::float(pool.realized_dominance(self.index, trait_index)))
            }
            "hemizygousDominanceForTrait" => {
                let pool = self.pool.borrow();
                Ok(Value::float(
                    pool.trait_info(self.index, trait_index).hemizygous_dominance(),
                ))
            }
            "setEffectForTrait" => {
                let effect = args[1].float_at(0)?;
                self.pool.borrow_mut().set_effect(self.index, trait_index, effect);
                Ok(Value::null_invisible())
            }
            "setDominanceForTrait" => {
                // the script-level sentinel for independent dominance is
                // NAN; it becomes the explicit tag at this boundary
                let h = args[1].float_at(0)?;
                let dominance =
                    if h.is_nan() { Dominance::Independent } else { Dominance::Coefficient(h) };
                self.pool.borrow_mut().set_dominance(self.index, trait_index, dominance);
                Ok(Value::null_invisible())
            }
            "setHemizygousDominanceForTrait" => {
                let h = args[1].float_at(0)?;
                self.pool.borrow_mut().set_hemizygous_dominance(self.index, trait_index, h);
                Ok(Value::null_invisible())
            }
            _ => Err(ScriptErrorKind::UnknownMethod {
                class: "Mutation".to_string(),
                method: name.to_string(),
            }),
        }
    }

    /// The set* methods are class methods: one invocation covers the whole
    /// receiver vector.
    fn execute_class_method(
        &self,
        name: &str,
        targets: &ObjectValue,
        args: &[Value],
    ) -> Result<Value, ScriptErrorKind> {
        match name {
            "setEffectForTrait" | "setDominanceForTrait" | "setHemizygousDominanceForTrait" => {
                for element in targets.elements() {
                    element.borrow().execute_instance_method(name, args)?;
                }
                Ok(Value::null_invisible())
            }
            _ => Err(ScriptErrorKind::UnknownMethod {
                class: "Mutation".to_string(),
                method: name.to_string(),
            }),
        }
    }
}
