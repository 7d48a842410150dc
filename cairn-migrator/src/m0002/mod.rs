//! Property type group aliases.

mod alias;

pub use alias::{generate_group_aliases, to_safe_alias};

use cairn_core::{
    ColumnDefinition, ColumnType, DatabaseError, IndexDefinition, SelectDefinition,
    UpdateDefinition,
};

use crate::{m0001::PROPERTY_TYPE_GROUP_TABLE, CoreMigration, Migration, MigrationContext};

/// Adds `alias` to `cairn_property_type_group` and fills it from `text`
/// with [`generate_group_aliases`].
pub struct AddPropertyTypeGroupAlias;

#[async_trait::async_trait]
impl Migration for AddPropertyTypeGroupAlias {
    fn name(&self) -> &'static str {
        CoreMigration::AddPropertyTypeGroupAlias.name()
    }

    async fn migrate(&self, ctx: &MigrationContext<'_>) -> anyhow::Result<()> {
        if !ctx.column_exists(PROPERTY_TYPE_GROUP_TABLE, "alias").await? {
            ctx.execute(crate::Expression::add_column(
                PROPERTY_TYPE_GROUP_TABLE,
                ColumnDefinition::new("alias", ColumnType::Text(Some(255))).nullable(),
            ))
            .await?;
        }

        let rows = ctx
            .select(
                &SelectDefinition::new(PROPERTY_TYPE_GROUP_TABLE)
                    .columns(["id", "text"])
                    .order_by("id"),
            )
            .await?
            .iter()
            .map(|row| -> Result<_, DatabaseError> { Ok((row.try_i64(0)?, row.try_string(1)?)) })
            .collect::<Result<Vec<_>, _>>()?;

        for (id, alias) in generate_group_aliases(&rows) {
            ctx.execute(
                UpdateDefinition::new(PROPERTY_TYPE_GROUP_TABLE)
                    .set("alias", alias)
                    .filter("id", id),
            )
            .await?;
        }

        ctx.execute(IndexDefinition::new(PROPERTY_TYPE_GROUP_TABLE, ["alias"]))
            .await?;

        tracing::debug!(groups = rows.len(), "property type group aliases generated");

        Ok(())
    }
}
