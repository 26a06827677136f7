//! Classification + extraction instruction sent with every document.
//!
//! The prompt embeds one JSON template per known document kind (already
//! extended with the caller's custom fields) plus the generic fallback shape.
//! Templates are rendered as JSON, the same shape the reply is parsed back
//! into.

use crate::schema::{other_document_template, ExtractionSchema};

/// Opening instruction of the prompt.
pub const CLASSIFY_INSTRUCTION: &str = "Please analyze the attached image(s) using OCR and classify the document_type of the document shown. \
Based on your analysis, return the appropriate result:";

/// Build the instruction text for one extraction call.
///
/// `schemas` are listed in the given order, each introduced by its
/// `document_type`; the generic shape closes the prompt.
pub fn build_extraction_prompt(schemas: &[ExtractionSchema]) -> String {
    let mut prompt = String::with_capacity(4096);
    prompt.push_str(CLASSIFY_INSTRUCTION);
    prompt.push_str("\n\n");

    for (i, schema) in schemas.iter().enumerate() {
        let lead = if i == 0 { "If" } else { "Else if" };
        prompt.push_str(&format!(
            "{lead} the document_type is \"{}\":\nReturn a JSON response:\n{}\n\n",
            schema.kind().as_str(),
            schema.to_prompt_json()
        ));
    }

    let known: Vec<String> = schemas
        .iter()
        .map(|s| format!("\"{}\"", s.kind().as_str()))
        .collect();
    prompt.push_str(&format!(
        "Else if the document_type is not {}:\nReturn a JSON response:\n{}\n",
        known.join(" or "),
        other_document_template()
    ));

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CustomFields;

    #[test]
    fn prompt_lists_every_kind_and_fallback() {
        let schemas = ExtractionSchema::all_extended(&CustomFields::default());
        let prompt = build_extraction_prompt(&schemas);

        assert!(prompt.starts_with(CLASSIFY_INSTRUCTION));
        assert!(prompt.contains("If the document_type is \"receipt\""));
        assert!(prompt.contains("Else if the document_type is \"invoice\""));
        assert!(prompt.contains("not \"receipt\" or \"invoice\""));
        assert!(prompt.contains("\"confidence_score\": <value between 0 and 1>"));
        assert!(prompt.contains("\"line_item\""));
        assert!(prompt.contains("\"supplier_npwp\""));
    }

    #[test]
    fn prompt_carries_custom_fields_in_both_templates() {
        let custom = CustomFields::from_form(["loyalty_id"], ["barcode"]);
        let prompt = build_extraction_prompt(&ExtractionSchema::all_extended(&custom));

        assert_eq!(prompt.matches("\"loyalty_id\": \"<loyalty_id>\"").count(), 2);
        assert_eq!(prompt.matches("\"barcode\": \"<barcode>\"").count(), 2);
    }
}
