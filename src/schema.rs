//! Field templates communicated to the generative model.
//!
//! A template maps each field name to a human-readable placeholder such as
//! `"<supplier name>"`. It doubles as the output contract sent in the prompt
//! and as the expected shape of the reply.
//!
//! The known document kinds form a closed set ([`DocumentKind`]); anything the
//! model classifies outside that set uses the generic fallback shape described
//! by [`other_document_template`].

use serde_json::{json, Map, Value};

/// A known document kind with its own field template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Receipt,
    Invoice,
}

impl DocumentKind {
    /// All known kinds, in prompt order.
    pub const ALL: [DocumentKind; 2] = [DocumentKind::Receipt, DocumentKind::Invoice];

    /// The `document_type` value the model is asked to emit.
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Receipt => "receipt",
            DocumentKind::Invoice => "invoice",
        }
    }

    /// Key of the nested repeated-item template.
    pub fn item_key(self) -> &'static str {
        match self {
            DocumentKind::Receipt => "line_item",
            DocumentKind::Invoice => "items",
        }
    }
}

/// Caller-supplied extra fields, applied to every known kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomFields {
    /// Extra top-level fields.
    pub headers: Vec<String>,
    /// Extra fields for each line item.
    pub items: Vec<String>,
}

impl CustomFields {
    /// Build from raw form values, where each value may itself be a
    /// comma-separated group.
    pub fn from_form<H, I>(headers: H, items: I) -> Self
    where
        H: IntoIterator,
        H::Item: AsRef<str>,
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        Self {
            headers: flatten_field_groups(headers),
            items: flatten_field_groups(items),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.items.is_empty()
    }
}

/// Split comma-separated groups and flatten them into one list of names.
///
/// Empty entries are dropped, so `["a,b", "", "c"]` becomes `["a", "b", "c"]`.
pub fn flatten_field_groups<T>(groups: T) -> Vec<String>
where
    T: IntoIterator,
    T::Item: AsRef<str>,
{
    groups
        .into_iter()
        .flat_map(|group| {
            group
                .as_ref()
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Placeholder text for a custom field.
pub fn placeholder(field: &str) -> String {
    format!("<{field}>")
}

/// The field template for one known document kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionSchema {
    kind: DocumentKind,
    fields: Map<String, Value>,
}

impl ExtractionSchema {
    /// The built-in template for `kind`.
    pub fn builtin(kind: DocumentKind) -> Self {
        let value = match kind {
            DocumentKind::Receipt => receipt_template(),
            DocumentKind::Invoice => invoice_template(),
        };
        let fields = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self { kind, fields }
    }

    /// Built-in templates for every known kind, each extended with `custom`.
    pub fn all_extended(custom: &CustomFields) -> Vec<Self> {
        DocumentKind::ALL
            .iter()
            .map(|&kind| {
                let mut schema = Self::builtin(kind);
                schema.extend(custom);
                schema
            })
            .collect()
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Merge custom header fields at the top level and custom item fields into
    /// the single nested item template. Re-adding a field is a no-op.
    pub fn extend(&mut self, custom: &CustomFields) {
        for field in &custom.headers {
            self.fields
                .insert(field.clone(), Value::String(placeholder(field)));
        }

        if custom.items.is_empty() {
            return;
        }
        let item = self
            .fields
            .get_mut(self.kind.item_key())
            .and_then(Value::as_array_mut)
            .and_then(|items| items.first_mut())
            .and_then(Value::as_object_mut);
        if let Some(item) = item {
            for field in &custom.items {
                item.insert(field.clone(), Value::String(placeholder(field)));
            }
        }
    }

    /// Pretty JSON rendering used inside the prompt.
    pub fn to_prompt_json(&self) -> String {
        serde_json::to_string_pretty(&self.fields).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Shape requested for documents that are neither receipts nor invoices.
pub fn other_document_template() -> &'static str {
    r#"{
  "document_type": "<document_type>",
  "confidence_score": <value between 0 and 1>,
  "explanation": "reason"
}"#
}

fn receipt_template() -> Value {
    json!({
        "document_type": "receipt",
        "cash_amount": "<amount that user should pay if any>",
        "change_amount": "<change amount>",
        "currency": "<currency>",
        "line_item": [{
            "amount": "<total amount for the product>",
            "description": "<product name or description>",
            "price_per_unit": "<price per unit item>",
            "quantity": "<quantity of the item>"
        }],
        "subtotal_amount": "<net amount or subtotal>",
        "payment_type": "<payment type>",
        "purchase_time": "<purchase time>",
        "receipt_date": "<receipt date in YYYY-MM-DD format>",
        "rounding_amount": "<rounding amount>",
        "service_charge_amount": "<service charge amount>",
        "supplier_address": "<supplier address>",
        "supplier_name": "<supplier name>",
        "supplier_phone": "<supplier phone>",
        "total_amount": "<total amount>",
        "tax_amount": "<total tax amount>"
    })
}

fn invoice_template() -> Value {
    json!({
        "document_type": "invoice",
        "customer_address": "<customer_address>",
        "customer_email": "<customer_email>",
        "customer_name": "<customer_name>",
        "customer_phone": "<customer_phone>",
        "delivery_fee_amount": "<delivery_fee_amount>",
        "fully_paid_amount": "<Total amount paid by the user, fully settling the invoice. This may be referred to as 'Lunas' or other similar terms indicating complete payment.>",
        "down_payment_amount": "<down_payment_amount>",
        "discount_amount": "<discount_amount>",
        "grand_total": "<grand_total>",
        "invoice_date": "<invoice_date YYYY-MM-DD format>",
        "invoice_due_date": "<invoice_due_date YYYY-MM-DD format>",
        "invoice_number": "<invoice_number>",
        "items": [{
            "item_code": "<item_code>",
            "item_product_name": "<product name>",
            "item_description": "<description product>",
            "item_discount": "<item_discount>",
            "item_price_unit": "<item_price_unit>",
            "item_quantity": "<item_quantity>",
            "item_tax": "<item_tax>",
            "item_total_amount": "<item_total_amount>",
            "item_unit": "<item_unit>"
        }],
        "purchase_order_number": "<purchase_order_number>",
        "subtotal_amount": "<subtotal_amount>",
        "supplier_account_name": "<supplier_account_name>",
        "supplier_address": "<supplier_address>",
        "supplier_bank": "<supplier_bank>",
        "supplier_bank_account": "<supplier_bank_account>",
        "supplier_email": "<supplier_email>",
        "supplier_name": "<supplier_name>",
        "supplier_npwp": "<supplier_npwp>",
        "supplier_phone": "<supplier_phone>",
        "tax_amount": "<tax_amount>",
        "tax_inclusive_amount": "<tax_inclusive_amount>",
        "total_amount": "<total_amount>"
    })
}
