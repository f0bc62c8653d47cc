//! Dependency resolution over the bundle graph.
//!
//! Resolution walks `depends` depth-first with three marks per bundle name (unvisited,
//! in progress, resolved). Reaching a bundle that is still in progress means the graph has a
//! cycle. Dependencies finish before their dependents, so [`BundleGraph::order`] is a valid
//! load order.
//!
//! Position hints flow from dependents to dependencies: a dependency without a JavaScript
//! position inherits the asserted one, and a dependency with a higher position than its
//! dependent is a configuration error. The walk uses an explicit stack, so graph depth is not
//! bounded by the call stack.

use indexmap::IndexMap;
use tracing::trace;

use crate::error::{CombinerError, Result};
use crate::models::Bundle;
use crate::registry::BundleSource;

/// Position constraint carried into a visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionHint {
  /// No constraint; the bundle's own hint still propagates to its dependencies.
  Free,
  /// Positions are ignored for the whole traversal.
  Suppressed,
  /// The bundle must load at or before this position.
  At(u32),
}

impl PositionHint {
  fn from_position(position: Option<u32>) -> Self {
    position.map_or(Self::Free, Self::At)
  }
}

/// Mark of a bundle name in the working map.
#[derive(Debug, Clone, PartialEq)]
pub enum VisitState {
  /// Not reached yet.
  Unvisited,
  /// Reached, dependencies still being resolved.
  InProgress,
  /// Fully resolved.
  Resolved(Bundle),
}

enum Frame {
  Visit { name: String, hint: PositionHint },
  Complete { bundle: Bundle, hint: PositionHint },
  Constrain { name: String, position: u32 },
}

/// Shared working map of a resolution pass.
#[derive(Debug, Default)]
pub struct BundleGraph {
  states: IndexMap<String, VisitState>,
  order: Vec<String>,
}

impl BundleGraph {
  /// Empty working map.
  pub fn new() -> Self {
    Self::default()
  }

  /// Resolve `name` and its dependency closure into the working map.
  pub fn resolve(
    &mut self,
    name: &str,
    source: &dyn BundleSource,
    hint: PositionHint,
  ) -> Result<&Bundle> {
    let mut stack = vec![Frame::Visit {
      name: name.to_string(),
      hint,
    }];

    while let Some(frame) = stack.pop() {
      match frame {
        Frame::Visit { name, hint } => self.visit(name, hint, source, &mut stack)?,
        Frame::Complete { bundle, hint } => {
          let name = bundle.name.clone();
          trace!(bundle = %name, "resolved bundle");
          self.order.push(name.clone());
          self.states.insert(name.clone(), VisitState::Resolved(bundle));
          if let PositionHint::At(position) = hint {
            stack.push(Frame::Constrain { name, position });
          }
        }
        Frame::Constrain { name, position } => self.constrain(&name, position, &mut stack)?,
      }
    }

    self
      .bundle(name)
      .ok_or_else(|| CombinerError::config(format!("asset bundle '{name}' was not resolved")))
  }

  fn visit(
    &mut self,
    name: String,
    hint: PositionHint,
    source: &dyn BundleSource,
    stack: &mut Vec<Frame>,
  ) -> Result<()> {
    match self.states.get(&name) {
      Some(VisitState::InProgress) => {
        return Err(CombinerError::CircularDependency { bundle: name });
      }
      Some(VisitState::Resolved(_)) => {
        if let PositionHint::At(position) = hint {
          stack.push(Frame::Constrain { name, position });
        }
        return Ok(());
      }
      Some(VisitState::Unvisited) | None => {}
    }

    let mut bundle = source.get_bundle(&name)?;
    bundle.name = name.clone();
    self.states.insert(name, VisitState::InProgress);

    let child_hint = match hint {
      PositionHint::Suppressed => PositionHint::Suppressed,
      _ => PositionHint::from_position(bundle.js_options.position),
    };
    let depends = bundle.depends.clone();
    stack.push(Frame::Complete { bundle, hint });
    push_visits(stack, &depends, child_hint);
    Ok(())
  }

  fn constrain(&mut self, name: &str, position: u32, stack: &mut Vec<Frame>) -> Result<()> {
    let Some(VisitState::Resolved(bundle)) = self.states.get_mut(name) else {
      return Ok(());
    };

    let effective = match bundle.js_options.position {
      None => {
        bundle.js_options.position = Some(position);
        position
      }
      Some(current) if current > position => {
        return Err(CombinerError::config(format!(
          "an asset bundle that depends on '{name}' has a higher javascript file position configured than '{name}'"
        )));
      }
      Some(current) => current,
    };

    let depends = bundle.depends.clone();
    push_visits(stack, &depends, PositionHint::At(effective));
    Ok(())
  }

  /// Current mark of `name`.
  pub fn state(&self, name: &str) -> &VisitState {
    static UNVISITED: VisitState = VisitState::Unvisited;
    self.states.get(name).unwrap_or(&UNVISITED)
  }

  /// Resolved bundle by name.
  pub fn bundle(&self, name: &str) -> Option<&Bundle> {
    match self.states.get(name) {
      Some(VisitState::Resolved(bundle)) => Some(bundle),
      _ => None,
    }
  }

  /// Names in resolution order: every dependency precedes its dependents.
  pub fn order(&self) -> &[String] {
    &self.order
  }

  /// Resolved bundles keyed by name, in resolution order.
  pub fn into_bundles(mut self) -> IndexMap<String, Bundle> {
    self
      .order
      .into_iter()
      .filter_map(|name| match self.states.swap_remove(&name) {
        Some(VisitState::Resolved(bundle)) => Some((name, bundle)),
        _ => None,
      })
      .collect()
  }
}

/// Dependencies are pushed in reverse so they pop in declaration order.
fn push_visits(stack: &mut Vec<Frame>, depends: &[String], hint: PositionHint) {
  for dep in depends.iter().rev() {
    stack.push(Frame::Visit {
      name: dep.clone(),
      hint,
    });
  }
}
