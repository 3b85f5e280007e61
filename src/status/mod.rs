// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Status model: the ordinal health verdict, per-condition statuses and the
//! per-object status tree returned to consumers.

mod object;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use object::{
    GroupKind, GroupResource, GroupVersionKind, Object, ObjectReference, OwnerReference,
};

/// Ordinal health verdict. The ordering is load-bearing: aggregation takes
/// the maximum across contributors, and `Unknown` sorts below `Ok` so that
/// any informative verdict dominates silence.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Verdict {
    #[default]
    Unknown,
    Ok,
    Warning,
    Error,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Unknown => "Unknown",
            Verdict::Ok => "Ok",
            Verdict::Warning => "Warning",
            Verdict::Error => "Error",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evaluated state of an object or condition. `progressing` is orthogonal to
/// `result`: an object may be healthy and still converging.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Status {
    pub result: Verdict,
    pub progressing: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// Rendered cause chain for statuses produced from an error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

impl Status {
    pub fn new(result: Verdict, progressing: bool) -> Self {
        Self {
            result,
            progressing,
            message: String::new(),
            err: None,
        }
    }
}

/// The raw `True`/`False`/`Unknown` value of a Kubernetes condition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum ConditionValue {
    True,
    False,
    #[default]
    Unknown,
}

impl<'de> Deserialize<'de> for ConditionValue {
    fn deserialize<D>(deserializer: D) -> core::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // Anything outside the documented values reads as Unknown.
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "True" => ConditionValue::True,
            "False" => ConditionValue::False,
            _ => ConditionValue::Unknown,
        })
    }
}

impl std::fmt::Display for ConditionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ConditionValue::True => "True",
            ConditionValue::False => "False",
            ConditionValue::Unknown => "Unknown",
        })
    }
}

/// A Kubernetes-style structured status entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionValue,
    pub reason: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

/// A raw condition paired with the status a condition analyzer derived for
/// it. Analyzers that decline a condition return `None` instead.
#[derive(Debug, Clone, Serialize)]
pub struct ConditionStatus {
    #[serde(flatten)]
    pub condition: Condition,
    /// The derived status; serialized as `health` to keep it apart from the
    /// condition's raw `status` value.
    #[serde(rename = "health")]
    pub status: Status,
}

/// Find a condition status by condition type, for analyzers that adjust an
/// already-analyzed condition (e.g. Deployment downgrading `Progressing`).
pub fn get_condition_mut<'a>(
    conditions: &'a mut [ConditionStatus],
    type_: &str,
) -> Option<&'a mut ConditionStatus> {
    conditions.iter_mut().find(|c| c.condition.type_ == type_)
}

/// Health of a single object, including analyzed conditions and the statuses
/// of its related sub-objects. Tree-structured and acyclic by construction.
#[derive(Debug, Clone)]
pub struct ObjectStatus {
    pub object: Arc<Object>,
    pub status: Status,
    pub sub_statuses: Vec<ObjectStatus>,
    pub conditions: Vec<ConditionStatus>,
}

impl ObjectStatus {
    /// Status for an intrinsically healthy object.
    pub fn ok(object: Arc<Object>, sub_statuses: Vec<ObjectStatus>) -> Self {
        Self {
            object,
            status: Status {
                result: Verdict::Ok,
                progressing: false,
                message: Verdict::Ok.to_string(),
                err: None,
            },
            sub_statuses,
            conditions: Vec::new(),
        }
    }

    /// Status for an object nothing could be determined about.
    pub fn unknown(object: Arc<Object>) -> Self {
        Self {
            object,
            status: Status {
                result: Verdict::Unknown,
                progressing: false,
                message: Verdict::Unknown.to_string(),
                err: None,
            },
            sub_statuses: Vec::new(),
            conditions: Vec::new(),
        }
    }

    /// Unknown status carrying the error that prevented evaluation. Used for
    /// loader and schema failures so that a partial tree is still returned.
    pub fn unknown_with_error(object: Arc<Object>, err: &anyhow::Error) -> Self {
        let mut ret = Self::unknown(object);
        ret.status.err = Some(format!("{err:#}"));
        ret
    }
}
