//! Uploaded reference document

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Accepted upload formats
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Docx,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Pdf => "pdf",
            FileType::Docx => "docx",
        }
    }

    /// Resolve from a filename's extension, case-insensitively
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, ext) = filename.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(FileType::Pdf),
            "docx" => Some(FileType::Docx),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub account_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub filename: String,

    #[sea_orm(column_type = "Text")]
    pub original_filename: String,

    #[sea_orm(column_type = "Text")]
    pub file_type: String,

    pub file_size: i64,

    #[serde(skip_serializing)]
    #[sea_orm(column_type = "Text", nullable)]
    pub content_text: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub local_path: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub remote_public_id: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub remote_url: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::account::Entity",
        from = "Column::AccountId",
        to = "super::account::Column::Id",
        on_delete = "Cascade"
    )]
    Account,

    #[sea_orm(has_many = "super::text_document::Entity")]
    TextDocument,
}

impl Related<super::account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Account.def()
    }
}

impl Related<super::text::Entity> for Entity {
    fn to() -> RelationDef {
        super::text_document::Relation::Text.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::text_document::Relation::Document.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_from_filename() {
        assert_eq!(FileType::from_filename("notes.PDF"), Some(FileType::Pdf));
        assert_eq!(FileType::from_filename("draft.final.docx"), Some(FileType::Docx));
        assert_eq!(FileType::from_filename("old.doc"), None);
        assert_eq!(FileType::from_filename("README"), None);
    }
}
