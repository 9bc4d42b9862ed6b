use hearth_db::ConnectionPool;
use hearth_model::Filters;
use hearth_query::{build_where, check_identifier};
use serde_json::Value;

use crate::engine::{RecordEngine, assemble};
use crate::error::EngineResult;
use crate::options::QueryOptions;

impl<P: ConnectionPool> RecordEngine<P> {
    /// Runs `SELECT <expr> AS value` over the matching rows.
    async fn scalar(
        &self,
        expr: &str,
        filters: &Filters,
        options: &QueryOptions,
    ) -> EngineResult<Value> {
        let mut params = Vec::new();
        let clause = build_where(
            filters,
            &mut params,
            &self.planner().where_options(options.include_soft_deleted),
        )?;
        let sql = assemble(&[
            &format!("SELECT {expr} AS value FROM {}", self.descriptor().table),
            &clause,
        ]);
        let rows = self.fetch(&sql, &params, options.use_cache).await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|mut row| row.remove("value"))
            .unwrap_or(Value::Null))
    }

    pub async fn count(&self, filters: &Filters, options: &QueryOptions) -> EngineResult<u64> {
        let value = self.scalar("COUNT(*)", filters, options).await?;
        Ok(value.as_u64().unwrap_or(0))
    }

    /// Sum of `field`; 0 when nothing matches.
    pub async fn sum(
        &self,
        field: &str,
        filters: &Filters,
        options: &QueryOptions,
    ) -> EngineResult<f64> {
        check_identifier(field)?;
        let value = self
            .scalar(&format!("COALESCE(SUM({field}), 0)"), filters, options)
            .await?;
        Ok(as_number(&value))
    }

    /// Mean of `field`; 0 when nothing matches.
    pub async fn average(
        &self,
        field: &str,
        filters: &Filters,
        options: &QueryOptions,
    ) -> EngineResult<f64> {
        check_identifier(field)?;
        let value = self
            .scalar(&format!("COALESCE(AVG({field}), 0)"), filters, options)
            .await?;
        Ok(as_number(&value))
    }

    /// Smallest value of `field`, or `None` when nothing matches.
    pub async fn min(
        &self,
        field: &str,
        filters: &Filters,
        options: &QueryOptions,
    ) -> EngineResult<Option<Value>> {
        check_identifier(field)?;
        let value = self
            .scalar(&format!("MIN({field})"), filters, options)
            .await?;
        Ok((!value.is_null()).then_some(value))
    }

    /// Largest value of `field`, or `None` when nothing matches.
    pub async fn max(
        &self,
        field: &str,
        filters: &Filters,
        options: &QueryOptions,
    ) -> EngineResult<Option<Value>> {
        check_identifier(field)?;
        let value = self
            .scalar(&format!("MAX({field})"), filters, options)
            .await?;
        Ok((!value.is_null()).then_some(value))
    }
}

fn as_number(value: &Value) -> f64 {
    match value {
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        other => other.as_f64().unwrap_or(0.0),
    }
}
