//! Domain models for admin.
//!
//! Every record here is persisted as JSON under the data directory; see
//! [`crate::db`] for the files and repositories.

pub mod admin_user;
pub mod order;
pub mod product;
pub mod session;
pub mod settings;

pub use admin_user::{AdminRole, AdminUser, NewAdminUser};
pub use order::{
    Customer, Order, OrderItem, PaymentInfo, Shipping, ShippingMethod, StatusChange,
};
pub use product::{Product, ProductInput};
pub use session::{CurrentAdmin, keys as session_keys};
pub use settings::{NotificationSettings, SiteConfig};
