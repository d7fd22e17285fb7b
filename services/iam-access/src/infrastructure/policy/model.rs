//! 策略模型
//!
//! 角色主体直接匹配 p 规则；用户主体经 g 分组在规则所属租户内继承角色

use casbin::DefaultModel;
use rbac_errors::{AppError, AppResult};

pub const RBAC_MODEL: &str = r#"
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, dom, obj, act

[role_definition]
g = _, _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = (r.sub == p.sub || g(r.sub, p.sub, p.dom)) && r.obj == p.obj && r.act == p.act
"#;

pub async fn rbac_model() -> AppResult<DefaultModel> {
    DefaultModel::from_str(RBAC_MODEL)
        .await
        .map_err(|e| AppError::internal(format!("Failed to load policy model: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use casbin::Model;

    #[tokio::test]
    async fn test_model_builds() {
        let model = rbac_model().await.unwrap();
        let data = model.get_model();
        assert!(data.contains_key("r"));
        assert!(data.contains_key("p"));
        assert!(data.contains_key("g"));
    }
}
