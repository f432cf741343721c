use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::executor::ExecutionOutcome;
use crate::operation::{Thrown, NULL_RECEIVER, PANIC};

/// How a thrown failure should be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    /// Legitimate behavior worth recording.
    Expected,
    /// Reveals a defect.
    Error,
    /// The inputs were illegitimate; the sequence is thrown away.
    Invalid,
}

/// Maps thrown failures to behaviors.
pub trait BehaviorClassifier: Send {
    fn classify(&self, thrown: &Thrown) -> Behavior;
}

/// Failure kind reported when the code under test runs out of memory.
pub const OUT_OF_MEMORY: &str = "out_of_memory";

/// Built-in kind-to-behavior table.
pub fn default_behavior_map() -> BTreeMap<String, Behavior> {
    BTreeMap::from([
        (PANIC.to_string(), Behavior::Error),
        (NULL_RECEIVER.to_string(), Behavior::Expected),
        (OUT_OF_MEMORY.to_string(), Behavior::Invalid),
    ])
}

/// Classifies by the thrown failure's `kind`; unknown kinds are Expected.
#[derive(Debug, Clone)]
pub struct KindClassifier {
    map: BTreeMap<String, Behavior>,
}

impl Default for KindClassifier {
    fn default() -> Self {
        KindClassifier {
            map: default_behavior_map(),
        }
    }
}

impl KindClassifier {
    pub fn new(map: BTreeMap<String, Behavior>) -> Self {
        KindClassifier { map }
    }
}

impl BehaviorClassifier for KindClassifier {
    fn classify(&self, thrown: &Thrown) -> Behavior {
        self.map.get(&thrown.kind).copied().unwrap_or(Behavior::Expected)
    }
}

/// Verdict on a whole candidate, from the outcome of its final statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Regression,
    ExpectedException,
    ErrorRevealing,
    Invalid,
    TimedOut,
}

impl Classification {
    pub fn of(outcome: &ExecutionOutcome, classifier: &dyn BehaviorClassifier) -> Self {
        match outcome {
            ExecutionOutcome::Normal { .. } => Classification::Regression,
            ExecutionOutcome::TimedOut => Classification::TimedOut,
            ExecutionOutcome::Exceptional { thrown, .. } => match classifier.classify(thrown) {
                Behavior::Expected => Classification::ExpectedException,
                Behavior::Error => Classification::ErrorRevealing,
                Behavior::Invalid => Classification::Invalid,
            },
        }
    }

    /// Becomes a reusable component.
    pub fn enters_pool(self) -> bool {
        self == Classification::Regression
    }

    /// Reported to the sink as an output.
    pub fn is_output(self) -> bool {
        matches!(
            self,
            Classification::Regression | Classification::ExpectedException | Classification::ErrorRevealing
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Classification::Regression => "regression",
            Classification::ExpectedException => "expected_exception",
            Classification::ErrorRevealing => "error_revealing",
            Classification::Invalid => "invalid",
            Classification::TimedOut => "timed_out",
        }
    }
}
