use crate::entities::SourceType;
use crate::framework::DatabaseProcessor;
use compact_str::CompactString;
use kanau::processor::Processor;

/// An offer provider. Created on first ingestion and never deleted.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Source {
    pub id: i64,
    pub name: CompactString,
    pub source_type: SourceType,
    pub created_at: time::PrimitiveDateTime,
}

#[derive(Debug, Clone)]
/// Get or create a source by name.
///
/// Names match case-insensitively; an existing row is returned unchanged.
pub struct UpsertSource {
    pub name: CompactString,
    pub source_type: SourceType,
}

impl Processor<UpsertSource> for DatabaseProcessor {
    type Output = Source;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpsertSource")]
    async fn process(&self, query: UpsertSource) -> Result<Source, sqlx::Error> {
        let source = sqlx::query_as::<_, Source>(
            r#"
            INSERT INTO sources (name, source_type)
            VALUES ($1, $2)
            ON CONFLICT ((lower(name))) DO UPDATE SET name = sources.name
            RETURNING id, name, source_type, created_at
            "#,
        )
        .bind(query.name.as_str())
        .bind(query.source_type)
        .fetch_one(&self.pool)
        .await?;
        Ok(source)
    }
}
