pub mod click_record;
pub mod conversion_record;
pub mod report_job;
pub mod tracking_definition;

pub use click_record::Entity as ClickRecordEntity;
pub use conversion_record::Entity as ConversionRecordEntity;
pub use report_job::Entity as ReportJobEntity;
pub use tracking_definition::Entity as TrackingDefinitionEntity;
