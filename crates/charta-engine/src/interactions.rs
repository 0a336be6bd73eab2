//! A table-driven [`InteractionDetector`].
//!
//! Rules name an unordered pair of medications. Names are matched
//! case-insensitively after trimming; nothing fuzzier than that.

use std::{convert::Infallible, future::Future};

use charta_core::interaction::{
  DrugInteractionWarning, InteractionDetector, InteractionSeverity,
};
use serde::{Deserialize, Serialize};

/// One known interaction between two medications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRule {
  pub first:       String,
  pub second:      String,
  pub severity:    InteractionSeverity,
  pub description: String,
}

impl InteractionRule {
  /// The other medication of the pair, if `name` is one of them.
  fn partner(&self, name: &str) -> Option<&str> {
    if same_medication(&self.first, name) {
      Some(&self.second)
    } else if same_medication(&self.second, name) {
      Some(&self.first)
    } else {
      None
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct InteractionTable {
  rules: Vec<InteractionRule>,
}

impl InteractionTable {
  pub fn new(rules: Vec<InteractionRule>) -> Self { Self { rules } }

  pub fn len(&self) -> usize { self.rules.len() }

  pub fn is_empty(&self) -> bool { self.rules.is_empty() }

  /// Interactions `medication` would introduce against `current`, in rule
  /// order. Pairs already present in `current` are not reported, so a
  /// medication that is already on the list introduces nothing.
  pub fn lookup(
    &self,
    medication: &str,
    current: &[String],
  ) -> Vec<DrugInteractionWarning> {
    let mut warnings = Vec::new();
    if current.iter().any(|name| same_medication(name, medication)) {
      return warnings;
    }
    for rule in &self.rules {
      let Some(partner) = rule.partner(medication) else {
        continue;
      };
      if let Some(existing) =
        current.iter().find(|name| same_medication(name, partner))
      {
        warnings.push(DrugInteractionWarning {
          medication_name: existing.clone(),
          severity:        rule.severity,
          description:     rule.description.clone(),
        });
      }
    }
    warnings
  }
}

impl InteractionDetector for InteractionTable {
  type Error = Infallible;

  fn detect<'a>(
    &'a self,
    medication: &'a str,
    current: &'a [String],
  ) -> impl Future<Output = Result<Vec<DrugInteractionWarning>, Self::Error>>
  + Send
  + 'a {
    std::future::ready(Ok(self.lookup(medication, current)))
  }
}

fn same_medication(a: &str, b: &str) -> bool {
  a.trim().eq_ignore_ascii_case(b.trim())
}
