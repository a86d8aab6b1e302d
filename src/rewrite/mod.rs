//! Transformations applied to item definitions just before upload

mod connections;
mod logical_ids;
mod notebook;

pub use connections::{BindingContext, KustoBinding, BLOB_STORAGE, SQL_SERVER};
pub use logical_ids::{ReferenceRewriter, ZERO_GUID};
pub use notebook::{attach_lakehouse, attached_lakehouse, AttachmentPolicy, LakehouseRef};
