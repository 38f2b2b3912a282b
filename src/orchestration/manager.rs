// Copyright (c) 2024 Mike Tsao

use crate::{
    error::TransformError,
    timing::Timer,
    traits::{Transformer, TransformerCore},
    transformers::{TransformerFactory, TransformerStage, TransformerState},
    types::{AudioCommand, Uid, UidFactory},
};
use anyhow::{anyhow, Result};
use rustc_hash::FxHashSet;

/// Owns an ordered list of [Transformer]s and runs batches through them, left
/// to right. The output of stage N is the input of stage N+1, so order
/// matters.
///
/// Structural changes (add, remove, replace, reorder) happen between batches.
/// Because [TransformerManager::transform()] takes `&mut self`, the borrow
/// checker guarantees that nobody changes the list mid-batch.
///
/// A stage that leaves (deleted, replaced, or swept away by
/// [TransformerManager::set_transformers()]) hands over Note-Offs for the
/// notes it still holds. They enter the next batch at the stage that
/// followed it, so downstream stages close whatever they made of those notes.
#[derive(Debug, Default)]
pub struct TransformerManager {
    uid_factory: UidFactory,
    transformers: Vec<Box<dyn Transformer>>,

    /// Note-Offs from departed stages, and the uid of the stage they enter
    /// at. `None` means they skip to the end of the pipeline.
    released: Vec<(Option<Uid>, Vec<AudioCommand>)>,
}
impl TransformerManager {
    /// Builds a manager from wire records, in order. Fails without building
    /// anything if any record names an unknown type or repeats a uid.
    pub fn from_states(factory: &TransformerFactory, states: &[TransformerState]) -> Result<Self> {
        let mut r = Self::default();
        let transformers = states
            .iter()
            .map(|state| factory.from_state(state))
            .collect::<Result<Vec<_>, _>>()?;
        r.set_transformers(transformers)?;
        Ok(r)
    }

    /// Appends a transformer to the end of the pipeline.
    ///
    /// The uid is determined using ordered rules.
    ///
    /// 1. If the transformer has an assigned Uid, then it is used. It's an
    ///    error if another stage already has it.
    /// 2. The manager generates a new Uid.
    pub fn add_transformer(&mut self, transformer: Box<dyn Transformer>) -> Result<Uid> {
        self.insert_transformer(self.transformers.len(), transformer)
    }

    /// Inserts a transformer at the given position. Same uid rules as
    /// [TransformerManager::add_transformer()].
    pub fn insert_transformer(
        &mut self,
        position: usize,
        mut transformer: Box<dyn Transformer>,
    ) -> Result<Uid> {
        if position > self.transformers.len() {
            return Err(anyhow!("position {position} is out of bounds"));
        }
        let uid = self.adopt(transformer.as_mut())?;
        self.transformers.insert(position, transformer);
        Ok(uid)
    }

    fn adopt(&self, transformer: &mut dyn Transformer) -> Result<Uid> {
        let uid = transformer.uid();
        let uid = if uid.is_assigned() {
            if self.position(uid).is_some() {
                return Err(anyhow!("Transformer {uid} is already in the pipeline"));
            }
            self.uid_factory.notify_externally_minted_uid(uid);
            uid
        } else {
            self.uid_factory.mint_next()
        };
        transformer.set_uid(uid);
        Ok(uid)
    }

    fn position(&self, uid: Uid) -> Option<usize> {
        self.transformers.iter().position(|t| t.uid() == uid)
    }

    /// Removes a transformer and returns ownership to the caller. Whatever it
    /// still holds stays with it; see [Transformer::release()].
    pub fn remove_transformer(&mut self, uid: Uid) -> Result<Box<dyn Transformer>> {
        self.take_out(uid).map(|(transformer, _)| transformer)
    }

    /// Removes a transformer and releases its resources. Its held notes are
    /// released through the rest of the pipeline on the next batch.
    pub fn delete_transformer(&mut self, uid: Uid) -> Result<()> {
        let (transformer, next) = self.take_out(uid)?;
        self.retire(transformer, next);
        Ok(())
    }

    /// Unlinks a transformer, and returns it with the uid of the stage that
    /// followed it.
    fn take_out(&mut self, uid: Uid) -> Result<(Box<dyn Transformer>, Option<Uid>)> {
        let Some(position) = self.position(uid) else {
            return Err(anyhow!("Transformer {uid} not found"));
        };
        let transformer = self.transformers.remove(position);
        let next = self.uid_at(position);
        self.reroute(uid, next);
        Ok((transformer, next))
    }

    /// Puts a new transformer where an existing one was. The newcomer takes
    /// the old uid, and the old transformer is released and destroyed.
    pub fn replace_transformer(
        &mut self,
        uid: Uid,
        mut transformer: Box<dyn Transformer>,
    ) -> Result<()> {
        let Some(position) = self.position(uid) else {
            return Err(anyhow!("Transformer {uid} not found"));
        };
        transformer.set_uid(uid);
        let old = std::mem::replace(&mut self.transformers[position], transformer);
        let next = self.uid_at(position + 1);
        self.reroute(uid, next);
        self.retire(old, next);
        Ok(())
    }

    fn uid_at(&self, position: usize) -> Option<Uid> {
        self.transformers.get(position).map(|t| t.uid())
    }

    /// Released notes waiting to enter at `uid` will enter at `next` instead.
    fn reroute(&mut self, uid: Uid, next: Option<Uid>) {
        self.released
            .iter_mut()
            .filter(|(target, _)| *target == Some(uid))
            .for_each(|(target, _)| *target = next);
    }

    /// Ends a departing stage: collects its Note-Offs for the next batch,
    /// then destroys it.
    fn retire(&mut self, mut departing: Box<dyn Transformer>, next: Option<Uid>) {
        let released = departing.release();
        if !released.is_empty() {
            log::debug!(
                "{} {} left with {} held notes",
                departing.key(),
                departing.uid(),
                released.len()
            );
            self.released.push((next, released));
        }
        departing.destroy();
    }

    /// Moves an existing transformer to a new position.
    pub fn move_transformer(&mut self, uid: Uid, new_position: usize) -> Result<()> {
        let Some(position) = self.position(uid) else {
            return Err(anyhow!("Transformer {uid} not found"));
        };
        if new_position >= self.transformers.len() {
            return Err(anyhow!(
                "Transformer {uid}'s new index {new_position} is out of bounds"
            ));
        }
        let transformer = self.transformers.remove(position);
        self.transformers.insert(new_position, transformer);
        Ok(())
    }

    /// Replaces the whole pipeline. The incoming list is checked first; if
    /// it repeats a uid, the current pipeline is left untouched. Notes the
    /// old stages still hold are released at the end of the next batch.
    pub fn set_transformers(&mut self, transformers: Vec<Box<dyn Transformer>>) -> Result<()> {
        let mut seen = FxHashSet::default();
        for t in transformers.iter().filter(|t| t.uid().is_assigned()) {
            if !seen.insert(t.uid()) {
                return Err(anyhow!("Transformer {} appears twice", t.uid()));
            }
        }
        // The new stages never saw what the old ones are holding.
        for old in std::mem::take(&mut self.transformers) {
            let uid = old.uid();
            self.reroute(uid, None);
            self.retire(old, None);
        }
        // Assigned uids go first so that minting can't collide with them.
        for t in transformers.iter() {
            if t.uid().is_assigned() {
                self.uid_factory.notify_externally_minted_uid(t.uid());
            }
        }
        for mut t in transformers {
            if !t.uid().is_assigned() {
                t.set_uid(self.uid_factory.mint_next());
            }
            self.transformers.push(t);
        }
        Ok(())
    }

    /// Reorders the pipeline to match `uids`, which must name every current
    /// stage exactly once.
    pub fn set_order(&mut self, uids: &[Uid]) -> Result<()> {
        let unique: FxHashSet<Uid> = uids.iter().copied().collect();
        if uids.len() != self.transformers.len() || unique.len() != uids.len() {
            return Err(anyhow!(
                "new order must list each of the {} transformers exactly once",
                self.transformers.len()
            ));
        }
        if let Some(missing) = uids.iter().find(|uid| self.position(**uid).is_none()) {
            return Err(anyhow!("Transformer {missing} not found"));
        }
        self.transformers.sort_by_key(|t| {
            uids.iter()
                .position(|uid| *uid == t.uid())
                .unwrap_or(usize::MAX)
        });
        Ok(())
    }

    /// Runs a batch through every stage in order. The first stage to fail
    /// aborts the batch. Stages keep their state either way, so the next
    /// batch is processed normally.
    ///
    /// Note-Offs released by departed stages lead the input of the stage
    /// they were routed to.
    pub fn transform(
        &mut self,
        commands: Vec<AudioCommand>,
        timer: &dyn Timer,
    ) -> Result<Vec<AudioCommand>, TransformError> {
        if self.released.is_empty() {
            return self
                .transformers
                .iter_mut()
                .try_fold(commands, |batch, t| t.transform(batch, timer));
        }
        let mut released = std::mem::take(&mut self.released);
        let mut batch = commands;
        for t in self.transformers.iter_mut() {
            let uid = t.uid();
            let mut input = Vec::default();
            released.retain_mut(|(target, commands)| {
                if *target == Some(uid) {
                    input.append(commands);
                    false
                } else {
                    true
                }
            });
            if !input.is_empty() {
                input.append(&mut batch);
                batch = input;
            }
            batch = match t.transform(batch, timer) {
                Ok(batch) => batch,
                Err(e) => {
                    self.released = released;
                    return Err(e);
                }
            };
        }
        let mut r: Vec<AudioCommand> = released
            .into_iter()
            .flat_map(|(_, commands)| commands)
            .collect();
        r.append(&mut batch);
        Ok(r)
    }

    /// How many Note-Offs from departed stages are waiting for the next
    /// batch.
    pub fn released_count(&self) -> usize {
        self.released.iter().map(|(_, commands)| commands.len()).sum()
    }

    /// Clears the transient state of every stage, and forgets Note-Offs from
    /// departed stages. Call it when the transport stops.
    pub fn reset(&mut self) {
        self.released.clear();
        self.transformers.iter_mut().for_each(|t| t.reset());
    }

    /// Releases every stage's resources.
    pub fn destroy(&mut self) {
        self.released.clear();
        self.transformers.iter_mut().for_each(|t| t.destroy());
    }

    #[allow(missing_docs)]
    pub fn transformer(&self, uid: Uid) -> Option<&dyn Transformer> {
        self.transformers
            .iter()
            .find(|t| t.uid() == uid)
            .map(|t| t.as_ref())
    }

    #[allow(missing_docs)]
    pub fn transformer_mut(&mut self, uid: Uid) -> Option<&mut Box<dyn Transformer>> {
        self.transformers.iter_mut().find(|t| t.uid() == uid)
    }

    /// Returns the concrete stage with the given uid, if it holds a `C`.
    pub fn stage<C: TransformerCore>(&self, uid: Uid) -> Option<&TransformerStage<C>> {
        self.transformer(uid)
            .and_then(|t| t.as_any().downcast_ref::<TransformerStage<C>>())
    }

    /// Mutable version of [TransformerManager::stage()].
    pub fn stage_mut<C: TransformerCore>(&mut self, uid: Uid) -> Option<&mut TransformerStage<C>> {
        self.transformer_mut(uid)
            .and_then(|t| t.as_any_mut().downcast_mut::<TransformerStage<C>>())
    }

    /// The stage uids, in pipeline order.
    pub fn uids(&self) -> Vec<Uid> {
        self.transformers.iter().map(|t| t.uid()).collect()
    }

    /// The wire records of every stage, in pipeline order.
    pub fn states(&self) -> Vec<TransformerState> {
        self.transformers.iter().map(|t| t.state()).collect()
    }

    #[allow(missing_docs)]
    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }
}
