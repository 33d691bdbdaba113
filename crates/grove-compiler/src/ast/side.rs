//! Typed side tables
//!
//! Information one pass hands to a later one, keyed by node or member
//! identity.

use super::{ClassId, Expr, NodeId};
use crate::annotations::{AnnotationValue, ResolvedAnnotation};
use rustc_hash::{FxHashMap, FxHashSet};

/// Identifies one parameter of one method
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParamKey {
    pub class: ClassId,
    /// [`MethodNode::signature_key`](super::MethodNode::signature_key) of the full method
    pub method: String,
    pub index: usize,
}

#[derive(Debug, Default)]
pub struct SideTables {
    /// Default-value expressions stripped from parameters
    pub parameter_defaults: FxHashMap<ParamKey, Expr>,
    /// Overloads produced by default-parameter expansion
    pub default_generated: FxHashSet<(ClassId, String)>,
    /// Annotation uses after attribute coercion, keyed by annotation node
    pub annotations: FxHashMap<NodeId, ResolvedAnnotation>,
    /// Coerced default values of annotation-type members
    pub annotation_defaults: FxHashMap<(ClassId, String), AnnotationValue>,
    /// Statements flagged by dead-code analysis
    pub unreachable: FxHashSet<NodeId>,
}

impl SideTables {
    pub fn parameter_default(&self, class: ClassId, method: &str, index: usize) -> Option<&Expr> {
        self.parameter_defaults.get(&ParamKey {
            class,
            method: method.to_string(),
            index,
        })
    }

    pub fn is_default_generated(&self, class: ClassId, signature: &str) -> bool {
        self.default_generated
            .contains(&(class, signature.to_string()))
    }
}
