//! Prompts sent to the vision model.
//!
//! The prompt is the only contract the provider sees: it has no schema
//! enforcement, so the instruction spells the expected JSON out and the
//! normaliser downstream still assumes the model may ignore it.
//!
//! The text is split in two parts. The *instruction* says what to do and
//! can be overridden through [`crate::config::ScanConfig::system_prompt`];
//! the *schema* lists the exact keys and is always appended, because the
//! normaliser depends on those key names.

use crate::config::FieldSet;
use crate::record::Category;

/// Default instruction for reading a receipt photo.
pub const DEFAULT_INSTRUCTION: &str = r#"Actúa como un asistente contable. Analiza esta imagen de un recibo de compra y extrae los datos indicados abajo.

Reglas:
1. Si el recibo no muestra la fecha, usa la fecha de hoy. Si la fecha no tiene año, asume el año actual.
2. Si no encuentras un dato, usa null.
3. "total" es el importe final pagado, como número sin símbolo de moneda.
4. Devuelve SOLAMENTE el objeto JSON. Sin texto adicional, sin explicaciones y sin bloques de código markdown."#;

/// Schema block for [`FieldSet::Basic`].
const SCHEMA_BASIC: &str = r#"{
    "fecha": "YYYY-MM-DD",
    "comercio": "Nombre del establecimiento",
    "total": 0.00,
    "moneda": "MXN",
    "categoria": "Elige una: {categories}"
}"#;

/// Schema block for [`FieldSet::Extended`].
const SCHEMA_EXTENDED: &str = r#"{
    "fecha": "YYYY-MM-DD",
    "comercio": "Nombre del establecimiento",
    "total": 0.00,
    "moneda": "MXN",
    "categoria": "Elige una: {categories}",
    "descripcion": "Resumen muy breve de lo comprado (máx. 5 palabras)"
}"#;

/// Text shown next to the image in the user turn.
pub const USER_MESSAGE: &str = "Extrae los datos de este recibo.";

/// Keys requested for a field set, in prompt order.
pub fn schema_keys(fields: FieldSet) -> &'static [&'static str] {
    match fields {
        FieldSet::Basic => &["fecha", "comercio", "total", "moneda", "categoria"],
        FieldSet::Extended => &[
            "fecha",
            "comercio",
            "total",
            "moneda",
            "categoria",
            "descripcion",
        ],
    }
}

/// Render the schema description for a field set.
pub fn schema_description(fields: FieldSet) -> String {
    let template = match fields {
        FieldSet::Basic => SCHEMA_BASIC,
        FieldSet::Extended => SCHEMA_EXTENDED,
    };
    let categories = Category::ALL
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Devuelve un objeto JSON con esta estructura exacta:\n{}",
        template.replace("{categories}", &categories)
    )
}

/// Instruction and schema, ready to become an
/// [`crate::pipeline::llm::ExtractionRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionPrompt {
    pub instruction: String,
    pub schema: String,
}

impl ExtractionPrompt {
    /// Built-in instruction, or `override_instruction` when given.
    pub fn new(fields: FieldSet, override_instruction: Option<&str>) -> Self {
        Self {
            instruction: override_instruction
                .unwrap_or(DEFAULT_INSTRUCTION)
                .to_string(),
            schema: schema_description(fields),
        }
    }

    /// The full system message.
    pub fn render(&self) -> String {
        format!("{}\n\n{}", self.instruction.trim_end(), self.schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_states_the_rules() {
        assert!(DEFAULT_INSTRUCTION.contains("fecha de hoy"));
        assert!(DEFAULT_INSTRUCTION.contains("null"));
        assert!(DEFAULT_INSTRUCTION.contains("SOLAMENTE el objeto JSON"));
        assert!(DEFAULT_INSTRUCTION.contains("markdown"));
    }

    #[test]
    fn basic_schema_has_exactly_five_keys() {
        let schema = schema_description(FieldSet::Basic);
        for key in schema_keys(FieldSet::Basic) {
            assert!(schema.contains(&format!("\"{key}\"")), "missing {key}");
        }
        assert!(!schema.contains("descripcion"));
    }

    #[test]
    fn extended_schema_adds_description() {
        let schema = schema_description(FieldSet::Extended);
        assert!(schema.contains("\"descripcion\""));
        assert_eq!(schema_keys(FieldSet::Extended).len(), 6);
    }

    #[test]
    fn schema_lists_every_category() {
        let schema = schema_description(FieldSet::Basic);
        for c in Category::ALL {
            assert!(schema.contains(c.as_str()));
        }
        assert!(!schema.contains("{categories}"));
    }

    #[test]
    fn override_keeps_schema() {
        let p = ExtractionPrompt::new(FieldSet::Basic, Some("Read the receipt."));
        let text = p.render();
        assert!(text.starts_with("Read the receipt."));
        assert!(text.contains("\"comercio\""));
    }
}
