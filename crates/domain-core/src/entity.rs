//! 实体基础 trait

use rbac_common::{AuditInfo, DomainId};

/// 实体 trait
pub trait Entity {
    type Id;

    fn id(&self) -> &Self::Id;
}

/// 聚合根 trait
pub trait AggregateRoot: Entity {
    fn audit_info(&self) -> &AuditInfo;
    fn audit_info_mut(&mut self) -> &mut AuditInfo;
}

/// 归属于单一租户的实体
pub trait DomainScoped {
    fn domain_id(&self) -> DomainId;

    /// 是否属于指定租户
    fn belongs_to(&self, domain_id: DomainId) -> bool {
        self.domain_id() == domain_id
    }
}
