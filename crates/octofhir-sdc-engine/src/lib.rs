//! SDC form evaluation engine
//!
//! The dependency-driven core of the forms stack: given an immutable
//! Questionnaire and a mutable QuestionnaireResponse, it keeps the derived
//! state consistent on every answer change — which items are enabled
//! (enableWhen / enableWhenExpression), which values are computed
//! (calculatedExpression), which answer options are populated from value
//! sets, and which tabs are complete.
//!
//! # Architecture
//!
//! - [`index::ItemIndex`]: linkId lookup and structural positions, built in
//!   one traversal
//! - [`extract::QuestionnaireModel`]: every derived artifact of a
//!   questionnaire definition
//! - [`evaluator::ExpressionEvaluator`]: the FHIRPath wrapper with the
//!   degrade-per-expression error policy
//! - [`enable_when::EnableWhenContext`]: the activation state machine with
//!   incremental reverse-dependency updates
//! - [`calculated::CalculatedContext`]: fixed-point recomputation with
//!   value-equality write suppression
//! - [`sync`]: order-preserving response tree merges
//! - [`value_set::ValueSetCache`] and [`terminology::TerminologyClient`]:
//!   coded answer options, offline tier first
//! - [`store::FormStore`]: the aggregate the hosting application owns
//!
//! Everything runs synchronously inside one "answer changed" step except
//! value-set expansion, which is awaited outside and rejoins through the
//! cache with stale-response protection.

pub mod calculated;
pub mod enable_when;
pub mod evaluator;
pub mod extract;
pub mod index;
pub mod store;
pub mod sync;
pub mod terminology;
pub mod value_set;

pub use calculated::{CalculatedContext, CalculatedWrite, MAX_CALCULATED_PASSES};
pub use enable_when::{answers_for, EnableWhenContext};
pub use evaluator::ExpressionEvaluator;
pub use extract::{CalculatedExpression, EnableWhenItem, QuestionnaireModel, Variables};
pub use index::{ItemEntry, ItemIndex};
pub use store::{ChangeSet, FormStore, InvalidKind, SavePolicy, Tab};
pub use sync::{merge_child, prune_empty};
pub use terminology::{StaticTerminology, TerminologyClient};
pub use value_set::ValueSetCache;
