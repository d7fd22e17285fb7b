//! PostgreSQL 策略 Adapter
//!
//! 将 p / g 元组扁平存储在 `casbin_rule` 表 (ptype, v0..v5)。
//! 写入成功即返回 true，重复写入与删除不存在的行都视为成功。

use async_trait::async_trait;
use casbin::error::AdapterError;
use casbin::{Adapter, Filter, Model};
use rbac_errors::AppError;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use tracing::{debug, instrument};

use crate::infrastructure::persistence::error_mapper::map_sqlx_error;

const MAX_FIELDS: usize = 6;

fn adapter_error(e: sqlx::Error) -> casbin::Error {
    casbin::Error::from(AdapterError(Box::new(map_sqlx_error(e))))
}

fn invalid_rule(msg: String) -> casbin::Error {
    casbin::Error::from(AdapterError(Box::new(AppError::validation(msg))))
}

#[derive(Debug, FromRow)]
struct CasbinRuleRow {
    ptype: String,
    v0: String,
    v1: String,
    v2: String,
    v3: String,
    v4: String,
    v5: String,
}

impl CasbinRuleRow {
    /// 去掉尾部空字段后的规则
    fn into_rule(self) -> (String, Vec<String>) {
        let mut rule = vec![self.v0, self.v1, self.v2, self.v3, self.v4, self.v5];
        while rule.last().is_some_and(|v| v.is_empty()) {
            rule.pop();
        }
        (self.ptype, rule)
    }
}

/// 规则补齐为 6 个字段
fn padded(rule: &[String]) -> casbin::Result<[String; MAX_FIELDS]> {
    if rule.len() > MAX_FIELDS {
        return Err(invalid_rule(format!(
            "Policy rule has {} fields, at most {} supported",
            rule.len(),
            MAX_FIELDS
        )));
    }
    let mut fields: [String; MAX_FIELDS] = Default::default();
    for (slot, value) in fields.iter_mut().zip(rule) {
        slot.clone_from(value);
    }
    Ok(fields)
}

fn section_of(ptype: &str) -> &'static str {
    if ptype.starts_with('g') { "g" } else { "p" }
}

pub struct PostgresPolicyAdapter {
    pool: PgPool,
    is_filtered: bool,
}

impl PostgresPolicyAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            is_filtered: false,
        }
    }

    async fn load_rows(&self) -> casbin::Result<Vec<CasbinRuleRow>> {
        sqlx::query_as::<_, CasbinRuleRow>(
            "SELECT ptype, v0, v1, v2, v3, v4, v5 FROM casbin_rule ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(adapter_error)
    }

    async fn insert_rules(&self, ptype: &str, rules: &[Vec<String>]) -> casbin::Result<()> {
        if rules.is_empty() {
            return Ok(());
        }
        let rows = rules
            .iter()
            .map(|r| padded(r))
            .collect::<casbin::Result<Vec<_>>>()?;

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO casbin_rule (ptype, v0, v1, v2, v3, v4, v5) ");
        builder.push_values(rows, |mut b, fields| {
            b.push_bind(ptype.to_string());
            for field in fields {
                b.push_bind(field);
            }
        });
        builder.push(" ON CONFLICT DO NOTHING");

        builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(adapter_error)?;
        Ok(())
    }

    async fn delete_rule(&self, ptype: &str, rule: &[String]) -> casbin::Result<u64> {
        let [v0, v1, v2, v3, v4, v5] = padded(rule)?;
        let result = sqlx::query(
            r#"
            DELETE FROM casbin_rule
            WHERE ptype = $1 AND v0 = $2 AND v1 = $3 AND v2 = $4 AND v3 = $5 AND v4 = $6 AND v5 = $7
            "#,
        )
        .bind(ptype)
        .bind(v0)
        .bind(v1)
        .bind(v2)
        .bind(v3)
        .bind(v4)
        .bind(v5)
        .execute(&self.pool)
        .await
        .map_err(adapter_error)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl Adapter for PostgresPolicyAdapter {
    #[instrument(skip(self, m))]
    async fn load_policy(&mut self, m: &mut dyn Model) -> casbin::Result<()> {
        let rows = self.load_rows().await?;
        let total = rows.len();
        for row in rows {
            let (ptype, rule) = row.into_rule();
            m.add_policy(section_of(&ptype), &ptype, rule);
        }
        self.is_filtered = false;
        debug!(rules = total, "Loaded policy rows");
        Ok(())
    }

    async fn load_filtered_policy<'a>(
        &mut self,
        m: &mut dyn Model,
        f: Filter<'a>,
    ) -> casbin::Result<()> {
        let rows = self.load_rows().await?;
        for row in rows {
            let (ptype, rule) = row.into_rule();
            let sec = section_of(&ptype);
            let filter = if sec == "g" { &f.g } else { &f.p };
            let matches = filter.iter().enumerate().all(|(i, value)| {
                value.is_empty() || rule.get(i).map(String::as_str) == Some(*value)
            });
            if matches {
                m.add_policy(sec, &ptype, rule);
            }
        }
        self.is_filtered = true;
        Ok(())
    }

    #[instrument(skip(self, m))]
    async fn save_policy(&mut self, m: &mut dyn Model) -> casbin::Result<()> {
        let mut rows = Vec::new();
        for sec in ["p", "g"] {
            let Some(assertions) = m.get_model().get(sec) else {
                continue;
            };
            for (ptype, ast) in assertions {
                for rule in ast.get_policy() {
                    rows.push((ptype.clone(), padded(rule)?));
                }
            }
        }

        let mut tx = self.pool.begin().await.map_err(adapter_error)?;
        sqlx::query("DELETE FROM casbin_rule")
            .execute(&mut *tx)
            .await
            .map_err(adapter_error)?;

        for (ptype, [v0, v1, v2, v3, v4, v5]) in rows {
            sqlx::query(
                r#"
                INSERT INTO casbin_rule (ptype, v0, v1, v2, v3, v4, v5)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(ptype)
            .bind(v0)
            .bind(v1)
            .bind(v2)
            .bind(v3)
            .bind(v4)
            .bind(v5)
            .execute(&mut *tx)
            .await
            .map_err(adapter_error)?;
        }

        tx.commit().await.map_err(adapter_error)?;
        Ok(())
    }

    async fn clear_policy(&mut self) -> casbin::Result<()> {
        sqlx::query("DELETE FROM casbin_rule")
            .execute(&self.pool)
            .await
            .map_err(adapter_error)?;
        Ok(())
    }

    fn is_filtered(&self) -> bool {
        self.is_filtered
    }

    async fn add_policy(
        &mut self,
        _sec: &str,
        ptype: &str,
        rule: Vec<String>,
    ) -> casbin::Result<bool> {
        self.insert_rules(ptype, std::slice::from_ref(&rule)).await?;
        Ok(true)
    }

    async fn add_policies(
        &mut self,
        _sec: &str,
        ptype: &str,
        rules: Vec<Vec<String>>,
    ) -> casbin::Result<bool> {
        self.insert_rules(ptype, &rules).await?;
        Ok(true)
    }

    async fn remove_policy(
        &mut self,
        _sec: &str,
        ptype: &str,
        rule: Vec<String>,
    ) -> casbin::Result<bool> {
        let deleted = self.delete_rule(ptype, &rule).await?;
        if deleted == 0 {
            debug!(ptype, rule = ?rule, "Policy row already absent");
        }
        Ok(true)
    }

    async fn remove_policies(
        &mut self,
        _sec: &str,
        ptype: &str,
        rules: Vec<Vec<String>>,
    ) -> casbin::Result<bool> {
        for rule in &rules {
            self.delete_rule(ptype, rule).await?;
        }
        Ok(true)
    }

    async fn remove_filtered_policy(
        &mut self,
        _sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: Vec<String>,
    ) -> casbin::Result<bool> {
        if field_index + field_values.len() > MAX_FIELDS {
            return Err(invalid_rule(format!(
                "Filter at index {} with {} values exceeds {} fields",
                field_index,
                field_values.len(),
                MAX_FIELDS
            )));
        }

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("DELETE FROM casbin_rule WHERE ptype = ");
        builder.push_bind(ptype.to_string());
        for (offset, value) in field_values.into_iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            builder.push(format!(" AND v{} = ", field_index + offset));
            builder.push_bind(value);
        }

        builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(adapter_error)?;
        Ok(true)
    }
}
