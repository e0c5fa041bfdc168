use rust_decimal::Decimal;

use crate::cpq::catalog::ServiceCatalog;
use crate::cpq::pricing::ServicePricing;
use crate::domain::quote::{ConfiguredService, PricingBreakdown, Quote};
use crate::domain::service::{FieldKind, FieldSpec, ServiceDefinition};
use crate::flows::fields::{field_hint, FieldRejection};

pub const ENTRY_MENU: &str = "Welcome! How would you like to build your quote?\n\
1. Configure services manually, one field at a time\n\
2. Describe your application and get an AI recommendation\n\
\n\
You can also just describe what you are building and I will suggest a setup.";

pub const CONFIRMATION_HELP: &str = "Reply 'yes' to confirm, 'modify' to change the values, \
'add more services' to configure another service, or 'restart' to start over.";

pub const QUOTE_FOLLOW_UP: &str = "Reply 'add more services' to extend this quote, \
'finalize' to keep it as is, or 'restart' to start over.";

pub fn money(currency: &str, amount: Decimal) -> String {
    format!("{currency} {amount:.2}")
}

pub fn service_menu(catalog: &dyn ServiceCatalog) -> String {
    let mut message = String::from("Which service would you like to configure?");
    for service in catalog.list() {
        message.push_str(&format!(
            "\n- {} ({}): {}",
            service.name, service.display_name, service.description
        ));
    }
    message.push_str("\nReply with the service name, one service at a time.");
    message
}

pub fn field_prompt(definition: &ServiceDefinition, index: usize) -> String {
    let Some(field) = definition.fields.get(index) else {
        return String::new();
    };

    let mut message =
        format!("[{}/{}] {}: {}", index + 1, definition.fields.len(), field.label, field.prompt);
    if let Some(hint) = field_hint(field) {
        message.push('\n');
        message.push_str(&hint);
    }
    message
}

pub fn rejection(field: &FieldSpec, rejection: &FieldRejection) -> String {
    let reason = match rejection {
        FieldRejection::Empty => format!("I need a value for {}.", field.label),
        FieldRejection::NotNumeric => format!("{} must be a number.", field.label),
        FieldRejection::OutOfRange => format!("That {} is outside the allowed range.", field.label),
        FieldRejection::UnknownOption => format!("That is not a valid {}.", field.label),
    };

    match field_hint(field) {
        Some(hint) => format!("{reason} {hint}"),
        None => reason,
    }
}

pub fn service_summary(
    definition: &ServiceDefinition,
    configured: &ConfiguredService,
    pricing: &ServicePricing,
) -> String {
    let mut message = format!("Here is your {} configuration:", definition.display_name);
    for field in &definition.fields {
        let value = configured.field_values.get(&field.key).map(String::as_str).unwrap_or("-");
        let unit = match &field.kind {
            FieldKind::Number { unit: Some(unit), .. } => format!(" {unit}"),
            _ => String::new(),
        };
        message.push_str(&format!("\n- {}: {value}{unit}", field.label));
    }

    message.push_str(&format!(
        "\n\nMonthly subtotal: {}\nVAT: {}\nTotal: {}",
        money(&pricing.currency, pricing.subtotal_local),
        money(&pricing.currency, pricing.vat),
        money(&pricing.currency, pricing.total),
    ));
    message
}

pub fn breakdown(pricing: &PricingBreakdown) -> String {
    format!(
        "Subtotal: {}\nVAT: {}\nTotal per month: {}",
        money(&pricing.currency, pricing.subtotal),
        money(&pricing.currency, pricing.vat),
        money(&pricing.currency, pricing.total),
    )
}

pub fn quote_summary(quote: &Quote) -> String {
    let mut message = format!("Your quote {} is ready:", quote.id.0);
    for service in &quote.services {
        message.push_str(&format!(
            "\n- {}: {} before VAT",
            service.display_name,
            money(&quote.pricing.currency, service.monthly_cost)
        ));
    }
    message.push_str("\n\n");
    message.push_str(&breakdown(&quote.pricing));
    message
}
