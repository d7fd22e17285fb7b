//! 请求上下文与租户解析

mod request_context;
mod resolver;

pub use request_context::{Actor, RequestContext};
pub use resolver::{ActorDomainResolver, DomainContextResolver};
