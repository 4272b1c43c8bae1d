//! Query and view types shared by the order handlers.

use serde::Deserialize;

use tienda_core::OrderStatus;

use crate::db::OrderFilter;
use crate::routes::FlashQuery;

/// Query parameters for the order list.
#[derive(Debug, Default, Deserialize)]
pub struct OrdersQuery {
    #[serde(flatten)]
    pub flash: FlashQuery,
    /// Status identifier, empty for all.
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub q: String,
    /// `""` active only, `"1"` archived only, `"all"` both.
    #[serde(default)]
    pub archived: String,
}

impl OrdersQuery {
    /// Parsed status filter; unknown values are ignored.
    #[must_use]
    pub fn status(&self) -> Option<OrderStatus> {
        self.status.trim().parse().ok()
    }

    #[must_use]
    pub fn filter(&self) -> OrderFilter {
        OrderFilter {
            statuses: self.status().into_iter().collect(),
            archived: match self.archived.as_str() {
                "all" => None,
                "1" | "true" => Some(true),
                _ => Some(false),
            },
            search: Some(self.q.trim().to_owned()).filter(|q| !q.is_empty()),
        }
    }

    /// The list URL with the same filters, for redirects after bulk actions.
    #[must_use]
    pub fn list_url(&self) -> String {
        let mut params = Vec::new();
        if let Some(status) = self.status() {
            params.push(format!("status={status}"));
        }
        if !self.q.trim().is_empty() {
            params.push(format!("q={}", urlencoding::encode(self.q.trim())));
        }
        if !self.archived.is_empty() {
            params.push(format!("archived={}", urlencoding::encode(&self.archived)));
        }
        if params.is_empty() {
            "/orders".to_owned()
        } else {
            format!("/orders?{}", params.join("&"))
        }
    }
}

/// A `<option>` for a status select.
#[derive(Debug, Clone)]
pub struct StatusOption {
    pub value: &'static str,
    pub label: &'static str,
    pub selected: bool,
    pub count: usize,
}

impl StatusOption {
    /// Every status, with `selected` marked.
    #[must_use]
    pub fn all(selected: Option<OrderStatus>, counts: &[(OrderStatus, usize)]) -> Vec<Self> {
        OrderStatus::ALL
            .into_iter()
            .map(|status| Self {
                value: status.as_str(),
                label: status.label(),
                selected: selected == Some(status),
                count: counts
                    .iter()
                    .find(|(s, _)| *s == status)
                    .map_or(0, |(_, count)| *count),
            })
            .collect()
    }

    /// Statuses an admin may move `from` into.
    #[must_use]
    pub fn next_for(from: OrderStatus) -> Vec<Self> {
        from.next_statuses()
            .into_iter()
            .map(|status| Self {
                value: status.as_str(),
                label: status.label(),
                selected: false,
                count: 0,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_defaults_to_active_orders() {
        let filter = OrdersQuery::default().filter();
        assert!(filter.statuses.is_empty());
        assert_eq!(filter.archived, Some(false));
        assert_eq!(filter.search, None);
    }

    #[test]
    fn test_unknown_status_is_ignored() {
        let query = OrdersQuery {
            status: "lost".to_owned(),
            archived: "all".to_owned(),
            ..OrdersQuery::default()
        };
        let filter = query.filter();
        assert!(filter.statuses.is_empty());
        assert_eq!(filter.archived, None);
    }

    #[test]
    fn test_list_url_keeps_filters() {
        let query = OrdersQuery {
            status: "approved".to_owned(),
            q: "ana gómez".to_owned(),
            ..OrdersQuery::default()
        };
        assert_eq!(
            query.list_url(),
            "/orders?status=approved&q=ana%20g%C3%B3mez"
        );
        assert_eq!(OrdersQuery::default().list_url(), "/orders");
    }
}
