//! MongoDB Index Initialization
//!
//! Creates the unique indexes the provisioning protocol relies on. The
//! service-level duplicate checks are only an early exit; these indexes are
//! the at-most-one guarantee under concurrent creates.

use mongodb::{bson::doc, options::IndexOptions, Database, IndexModel};
use tracing::info;

use crate::principal::entity::PrincipalKind;

/// Initialize all profile indexes
pub async fn initialize_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    info!("Initializing MongoDB indexes...");

    for kind in PrincipalKind::ALL {
        create_profile_indexes(db, kind).await?;
    }

    info!("MongoDB indexes initialized successfully");
    Ok(())
}

async fn create_profile_indexes(db: &Database, kind: PrincipalKind) -> Result<(), mongodb::error::Error> {
    let collection = db.collection::<mongodb::bson::Document>(kind.collection_name());

    // Email unique within the kind
    collection.create_index(
        IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build(),
    ).await?;

    // Join key to the identity directory
    collection.create_index(
        IndexModel::builder()
            .keys(doc! { "externalId": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build(),
    ).await?;

    if kind == PrincipalKind::Student {
        collection.create_index(
            IndexModel::builder()
                .keys(doc! { "details.registrationNumber": 1 })
                .options(IndexOptions::builder()
                    .unique(true)
                    .partial_filter_expression(doc! {
                        "details.registrationNumber": { "$exists": true }
                    })
                    .build())
                .build(),
        ).await?;
    }

    info!(collection = kind.collection_name(), "Created indexes");
    Ok(())
}
