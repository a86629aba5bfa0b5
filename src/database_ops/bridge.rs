//! `fact_adaptation_actor` bridge: cast of each adapted movie.
use crate::database_ops::facts::required_key;
use crate::database_ops::model::{AdaptationActorRow, CastCredit, Dimension};
use crate::database_ops::pass::{drive, PassOptions};
use crate::database_ops::report::PassSummary;
use crate::database_ops::source::SourceCatalog;
use crate::database_ops::warehouse::Warehouse;
use crate::error::LoadError;
use crate::normalization::names::clean;

pub async fn bridge_row(
    warehouse: &dyn Warehouse,
    credit: CastCredit,
) -> Result<AdaptationActorRow, LoadError> {
    let book_key = required_key(warehouse, Dimension::Book, credit.book_id).await?;
    let movie_key = required_key(warehouse, Dimension::Movie, credit.movie_id).await?;
    let adaptation_key = warehouse
        .adaptation_key(book_key, movie_key)
        .await?
        .ok_or(LoadError::MissingAdaptation {
            book_id: credit.book_id,
            movie_id: credit.movie_id,
        })?;
    let actor_key = required_key(warehouse, Dimension::Actor, credit.person_id).await?;
    Ok(AdaptationActorRow {
        adaptation_key,
        actor_key,
        character_name: clean(credit.character_name),
        cast_order: credit.cast_order,
        is_lead_role: credit.is_lead_role.unwrap_or(false),
    })
}

pub async fn load_bridge(
    source: &dyn SourceCatalog,
    warehouse: &dyn Warehouse,
    opts: &PassOptions,
) -> Result<PassSummary, LoadError> {
    drive(
        "fact_adaptation_actor",
        opts,
        |after| source.adaptation_cast(after, opts.batch_size),
        |credit: CastCredit| async move {
            let row = bridge_row(warehouse, credit).await?;
            warehouse.upsert_adaptation_actor(&row).await
        },
    )
    .await
}
