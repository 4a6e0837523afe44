//! Permission strings and the route access table.
//!
//! The authenticating proxy hands the portal a flat list of permission
//! strings per user. Routes are gated by the first matching [`RouteRule`];
//! individual mutations additionally require one of an operation's
//! permissions (see [`Operation::required`]).

pub const CAMPAIGN_EDIT: &str = "portal:campaign:edit";
pub const EMPLOYEE_EDIT: &str = "portal:employee:edit";
pub const SERVICE_ITEM_EDIT: &str = "portal:service-item:edit";
pub const USER_LOGIN: &str = "user:login";

/// One row of the route access table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteRule {
    pub route: &'static str,
    /// Match every path starting with `route` instead of only the exact path.
    pub prefix: bool,
    /// `None` means the route is open to unauthenticated callers.
    pub permission: Option<&'static str>,
}

impl RouteRule {
    pub fn matches(&self, path: &str) -> bool {
        if self.prefix {
            path.starts_with(self.route)
        } else {
            path == self.route
        }
    }
}

/// Ordered, first match wins.
pub const ROUTE_ACCESS: &[RouteRule] = &[
    RouteRule {
        route: "/health",
        prefix: false,
        permission: None,
    },
    RouteRule {
        route: "/api/internal/",
        prefix: true,
        permission: None,
    },
    RouteRule {
        route: "/api/",
        prefix: true,
        permission: Some(USER_LOGIN),
    },
];

/// Outcome of checking a path against [`ROUTE_ACCESS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    Open,
    Requires(&'static str),
    /// No rule matched. Unlisted routes are never served.
    Unlisted,
}

pub fn route_access(path: &str) -> RouteAccess {
    match ROUTE_ACCESS.iter().find(|rule| rule.matches(path)) {
        Some(RouteRule {
            permission: Some(p),
            ..
        }) => RouteAccess::Requires(p),
        Some(_) => RouteAccess::Open,
        None => RouteAccess::Unlisted,
    }
}

/// Mutating operation families and the permissions that unlock them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Service categories, service items, packages, permissions, task
    /// templates and campaign profiles.
    EditCatalog,
    /// Partners, campaigns and notes.
    EditCampaigns,
    EditAccessItems,
}

impl Operation {
    /// Any one of the returned permissions is sufficient.
    pub fn required(&self) -> &'static [&'static str] {
        match self {
            Self::EditCatalog => &[SERVICE_ITEM_EDIT, CAMPAIGN_EDIT],
            Self::EditCampaigns => &[CAMPAIGN_EDIT],
            Self::EditAccessItems => &[EMPLOYEE_EDIT],
        }
    }
}

pub fn has_permission<S: AsRef<str>>(granted: &[S], permission: &str) -> bool {
    granted.iter().any(|g| g.as_ref() == permission)
}

pub fn allows<S: AsRef<str>>(granted: &[S], op: Operation) -> bool {
    op.required().iter().any(|p| has_permission(granted, p))
}

/// Parse the comma-separated permission header into individual strings.
pub fn parse_permission_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
