use crate::{contact::ValidatedContactFormMessage, BRAND};
use serde::Serialize;
use serde_json::Value;
use tinytemplate::{error::Error, format, TinyTemplate};

const CONFIRMATION_TEMPLATE_NAME: &str = "confirmation-template";
const NOTIFICATION_TEMPLATE_NAME: &str = "notification-template";
const CONFIRMATION_TEMPLATE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/assets/confirmation.html"
));
const NOTIFICATION_TEMPLATE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/assets/notification.html"
));

#[derive(Serialize)]
struct ConfirmationContext<'a> {
    brand: &'a str,
    name: &'a str,
    message: &'a str,
}

#[derive(Serialize)]
struct NotificationContext<'a> {
    name: &'a str,
    email: &'a str,
    phone: Option<&'a str>,
    company: Option<&'a str>,
    message: &'a str,
}

/// Renders the auto-reply sent back to the person who filled in the form.
pub fn render_confirmation(message: &ValidatedContactFormMessage) -> Result<String, Error> {
    let context = ConfirmationContext {
        brand: BRAND,
        name: message.name,
        message: message.message,
    };
    templates()?.render(CONFIRMATION_TEMPLATE_NAME, &context)
}

/// Renders the internal notification listing every submitted field.
pub fn render_notification(message: &ValidatedContactFormMessage) -> Result<String, Error> {
    let context = NotificationContext {
        name: message.name,
        email: message.email,
        phone: message.phone,
        company: message.company,
        message: message.message,
    };
    templates()?.render(NOTIFICATION_TEMPLATE_NAME, &context)
}

fn templates() -> Result<TinyTemplate<'static>, Error> {
    let mut tt = TinyTemplate::new();
    tt.add_formatter("line_breaks", render_line_breaks);
    tt.add_template(CONFIRMATION_TEMPLATE_NAME, CONFIRMATION_TEMPLATE)?;
    tt.add_template(NOTIFICATION_TEMPLATE_NAME, NOTIFICATION_TEMPLATE)?;
    Ok(tt)
}

// Escapes first so that only the inserted <br> survives as markup.
fn render_line_breaks(value: &Value, output: &mut String) -> Result<(), Error> {
    let mut formatted = String::new();
    format(value, &mut formatted)?;
    output.push_str(&formatted.replace("\r\n", "\n").replace('\n', "<br>"));
    Ok(())
}
