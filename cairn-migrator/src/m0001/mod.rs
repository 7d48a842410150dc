//! Initial schema.

use cairn_core::{ColumnDefinition, ColumnType, IndexDefinition, TableDefinition};

use crate::{key_value::KEY_VALUE_TABLE, CoreMigration, Migration, MigrationContext};

pub(crate) const PROPERTY_TYPE_GROUP_TABLE: &str = "cairn_property_type_group";

/// Creates the tables every installation starts with:
///
/// - `cairn_key_value` - installation wide settings (`key`, `value`, `updated`)
/// - `cairn_property_type_group` - named groups of properties on a content
///   type (`id`, `content_type_id`, `text`, `sort_order`), indexed on
///   `content_type_id`
pub struct InitialSchema;

#[async_trait::async_trait]
impl Migration for InitialSchema {
    fn name(&self) -> &'static str {
        CoreMigration::InitialSchema.name()
    }

    async fn migrate(&self, ctx: &MigrationContext<'_>) -> anyhow::Result<()> {
        ctx.execute(
            TableDefinition::new(KEY_VALUE_TABLE)
                .column(ColumnDefinition::new("key", ColumnType::Text(Some(256))).primary_key())
                .column(ColumnDefinition::new("value", ColumnType::Text(None)).nullable())
                .column(ColumnDefinition::new("updated", ColumnType::Text(Some(64)))),
        )
        .await?;

        ctx.execute(
            TableDefinition::new(PROPERTY_TYPE_GROUP_TABLE)
                .column(
                    ColumnDefinition::new("id", ColumnType::Integer)
                        .primary_key()
                        .identity(),
                )
                .column(ColumnDefinition::new("content_type_id", ColumnType::Integer).nullable())
                .column(ColumnDefinition::new("text", ColumnType::Text(Some(255))))
                .column(ColumnDefinition::new("sort_order", ColumnType::Integer).default_value(0)),
        )
        .await?;

        ctx.execute(IndexDefinition::new(
            PROPERTY_TYPE_GROUP_TABLE,
            ["content_type_id"],
        ))
        .await?;

        Ok(())
    }
}
