//! xfn core: the composition-function protocol.
//!
//! Request/response data model, the result/condition taxonomy, resource
//! selectors for the extra-resource negotiation, and the response builder
//! that enforces tag echo and TTL/requirements exclusivity.

#![forbid(unsafe_code)]

pub mod codec;
pub mod error;
pub mod request;
pub mod resource;
pub mod response;
pub mod result;
pub mod selector;
pub mod state;

pub use codec::Document;
pub use error::{XfnError, XfnResult};
pub use request::{CredentialData, Credentials, RequestMeta, RunFunctionRequest, WATCHED_RESOURCE_REQUIREMENT};
pub use resource::{Ready, Resource, ResourceBuilder, StatusCondition};
pub use response::{ResponseBuilder, ResponseMeta, RunFunctionResponse, DEFAULT_TTL};
pub use result::{Condition, FunctionResult, Severity, Status, Target};
pub use selector::{Match, Requirements, ResourceSelector};
pub use state::State;

pub mod prelude {
    pub use super::response;
    pub use super::{
        Condition, Document, FunctionResult, Match, Ready, Resource, ResourceSelector, RunFunctionRequest,
        RunFunctionResponse, Severity, State, Status, Target, XfnError, XfnResult,
    };
}
