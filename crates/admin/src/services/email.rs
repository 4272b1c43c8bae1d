//! Email service for order notifications.
//!
//! Uses SMTP via lettre for delivery with Askama HTML templates.

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use tienda_core::NotificationEvent;

use crate::config::EmailConfig;
use crate::models::Order;

/// One order line as shown in emails.
#[derive(Debug, Clone)]
pub struct EmailLine {
    pub name: String,
    pub quantity: u32,
    pub total: String,
}

/// HTML template for order status emails.
#[derive(Template)]
#[template(path = "email/order_update.html")]
struct OrderUpdateEmailHtml<'a> {
    store_name: &'a str,
    title: &'a str,
    message: &'a str,
    customer_name: &'a str,
    order_id: &'a str,
    lines: &'a [EmailLine],
    shipping_cost: String,
    total: String,
    carrier: Option<&'a str>,
    tracking_number: Option<&'a str>,
}

/// Plain text template for order status emails.
#[derive(Template)]
#[template(path = "email/order_update.txt")]
struct OrderUpdateEmailText<'a> {
    store_name: &'a str,
    title: &'a str,
    message: &'a str,
    customer_name: &'a str,
    order_id: &'a str,
    lines: &'a [EmailLine],
    shipping_cost: String,
    total: String,
    carrier: Option<&'a str>,
    tracking_number: Option<&'a str>,
}

/// HTML template for the settings-page test email.
#[derive(Template)]
#[template(path = "email/test.html")]
struct TestEmailHtml<'a> {
    store_name: &'a str,
}

/// Plain text template for the settings-page test email.
#[derive(Template)]
#[template(path = "email/test.txt")]
struct TestEmailText<'a> {
    store_name: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl std::fmt::Debug for EmailService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailService")
            .field("from_address", &self.from_address)
            .finish_non_exhaustive()
    }
}

/// Body text for an order event, addressed to the buyer.
#[must_use]
pub const fn event_message(event: NotificationEvent) -> &'static str {
    match event {
        NotificationEvent::PaymentApproved => {
            "Recibimos tu pago. Ya estamos preparando tu pedido."
        }
        NotificationEvent::PaymentPending => {
            "Tu pago está pendiente de acreditación. Te avisamos apenas se confirme."
        }
        NotificationEvent::PaymentRejected => {
            "Tu pago fue rechazado. Podés intentar nuevamente con otro medio de pago."
        }
        NotificationEvent::OrderCancelled => "Tu pedido fue cancelado.",
        NotificationEvent::PaymentRefunded => "Te reintegramos el pago de tu pedido.",
        NotificationEvent::OrderPreparing => "Estamos preparando tu pedido.",
        NotificationEvent::OrderShipped => "Tu pedido está en camino.",
        NotificationEvent::OrderDelivered => "Tu pedido fue entregado. ¡Gracias por tu compra!",
    }
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if SMTP connection fails.
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }

    /// Send an order status email.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_order_update(
        &self,
        to: &str,
        store_name: &str,
        order: &Order,
        event: NotificationEvent,
    ) -> Result<(), EmailError> {
        let lines: Vec<EmailLine> = order
            .items
            .iter()
            .map(|item| EmailLine {
                name: item.name.clone(),
                quantity: item.quantity,
                total: item
                    .line_total()
                    .map_or_else(|| "-".to_owned(), |total| total.to_string()),
            })
            .collect();
        let title = event.title();
        let message = event_message(event);
        let carrier = order.shipping.carrier.as_deref();
        let tracking_number = order.shipping.tracking_number.as_deref();

        let html = OrderUpdateEmailHtml {
            store_name,
            title,
            message,
            customer_name: &order.customer.name,
            order_id: order.id.as_str(),
            lines: &lines,
            shipping_cost: order.shipping_cost.to_string(),
            total: order.total.to_string(),
            carrier,
            tracking_number,
        }
        .render()?;
        let text = OrderUpdateEmailText {
            store_name,
            title,
            message,
            customer_name: &order.customer.name,
            order_id: order.id.as_str(),
            lines: &lines,
            shipping_cost: order.shipping_cost.to_string(),
            total: order.total.to_string(),
            carrier,
            tracking_number,
        }
        .render()?;

        let subject = format!("{title} - Pedido {} - {store_name}", order.id);
        self.send_multipart_email(to, &subject, &text, &html).await
    }

    /// Send the settings-page test email.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_test(&self, to: &str, store_name: &str) -> Result<(), EmailError> {
        let html = TestEmailHtml { store_name }.render()?;
        let text = TestEmailText { store_name }.render()?;

        self.send_multipart_email(to, &format!("Email de prueba - {store_name}"), &text, &html)
            .await
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        self.mailer.send(email).await?;

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::order::fixtures;

    #[test]
    fn test_order_email_renders_lines_and_tracking() {
        let mut order = fixtures::order("ord_mail", &[("prod_a", 2)]);
        order.shipping.carrier = Some("Andreani".to_owned());
        order.shipping.tracking_number = Some("AND-777".to_owned());
        let lines = vec![EmailLine {
            name: "Mate <imperial>".to_owned(),
            quantity: 2,
            total: "$ 2.000,00".to_owned(),
        }];

        let html = OrderUpdateEmailHtml {
            store_name: "Tienda",
            title: NotificationEvent::OrderShipped.title(),
            message: event_message(NotificationEvent::OrderShipped),
            customer_name: &order.customer.name,
            order_id: order.id.as_str(),
            lines: &lines,
            shipping_cost: order.shipping_cost.to_string(),
            total: order.total.to_string(),
            carrier: order.shipping.carrier.as_deref(),
            tracking_number: order.shipping.tracking_number.as_deref(),
        }
        .render()
        .unwrap();

        assert!(html.contains("ord_mail"));
        assert!(html.contains("AND-777"));
        assert!(html.contains("Mate &#60;imperial&#62;") || html.contains("Mate &lt;imperial&gt;"));
    }

    #[test]
    fn test_every_event_has_a_message() {
        for event in NotificationEvent::ALL {
            assert!(!event_message(event).is_empty());
        }
    }
}
