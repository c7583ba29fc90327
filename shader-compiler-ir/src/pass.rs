// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

use crate::program::Program;
use log::trace;

/// a transformation over a `Program`
///
/// `C` is whatever context the pass needs, e.g. a descriptor layout.
pub trait Pass<C: ?Sized> {
    /// name used in log messages
    fn name(&self) -> &'static str;
    /// run the pass, returning `true` if `program` changed
    fn run(&self, program: &mut Program, context: &C) -> bool;
}

/// the result of `PassList::run_to_fixed_point`
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FixedPointOutcome {
    /// number of iterations over the whole list
    pub iterations: usize,
    /// `false` if the iteration limit was hit while passes still made progress
    pub converged: bool,
    /// at least one pass changed the program
    pub changed: bool,
}

/// an ordered list of passes
pub struct PassList<'a, C: ?Sized> {
    passes: Vec<Box<dyn Pass<C> + 'a>>,
}

impl<'a, C: ?Sized> Default for PassList<'a, C> {
    fn default() -> Self {
        Self { passes: Vec::new() }
    }
}

impl<'a, C: ?Sized> PassList<'a, C> {
    /// create an empty list
    pub fn new() -> Self {
        Self::default()
    }
    /// append `pass`
    pub fn push<P: Pass<C> + 'a>(&mut self, pass: P) -> &mut Self {
        self.passes.push(Box::new(pass));
        self
    }
    /// append `pass`, builder style
    pub fn with<P: Pass<C> + 'a>(mut self, pass: P) -> Self {
        self.push(pass);
        self
    }
    /// number of passes
    pub fn len(&self) -> usize {
        self.passes.len()
    }
    /// `true` if there are no passes
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
    /// the pass names in order
    pub fn names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }
    /// run every pass once, in order
    pub fn run_once(&self, program: &mut Program, context: &C) -> bool {
        let mut changed = false;
        for pass in &self.passes {
            if pass.run(program, context) {
                trace!("{}: pass {} made progress", program.stage, pass.name());
                changed = true;
            }
        }
        changed
    }
    /// run the list repeatedly until no pass makes progress
    ///
    /// stops after `max_iterations` iterations even if progress is still
    /// being made.
    pub fn run_to_fixed_point(
        &self,
        program: &mut Program,
        context: &C,
        max_iterations: usize,
    ) -> FixedPointOutcome {
        let mut outcome = FixedPointOutcome {
            iterations: 0,
            converged: false,
            changed: false,
        };
        while outcome.iterations < max_iterations {
            outcome.iterations += 1;
            if !self.run_once(program, context) {
                outcome.converged = true;
                break;
            }
            outcome.changed = true;
        }
        trace!(
            "{}: fixed point after {} iterations (converged: {})",
            program.stage,
            outcome.iterations,
            outcome.converged
        );
        outcome
    }
}
