//! Extraction adapter implementations.

mod command;
pub mod legacy_office;
pub mod office_convert;
pub mod pdf_text;
pub mod text_native;

pub use legacy_office::LegacyOfficeAdapter;
pub use office_convert::OfficeConvertAdapter;
pub use pdf_text::PdfTextAdapter;
pub use text_native::TextNativeAdapter;
