pub mod document_number;
pub mod gst;
pub mod gstin;
