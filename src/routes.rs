//! Route guard: maps a path and sign-in status to a destination.

use serde::Serialize;

pub const LANDING_PATH: &str = "/";
pub const AUTH_PATH: &str = "/auth";
pub const DASHBOARD_PATH: &str = "/dashboard";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Page {
    Landing,
    Auth,
    Dashboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Navigation {
    Render(Page),
    /// Replace the current location with this path.
    Redirect(&'static str),
}

/// Decide what to show for `path`.
///
/// - `/` renders the landing page for everyone.
/// - `/auth` renders the auth form, or sends signed-in users to the dashboard.
/// - `/dashboard` and anything below it render the dashboard, or send
///   anonymous users to the auth form.
/// - Every other path redirects to `/`.
///
/// Matching ignores ASCII case.
#[must_use]
pub fn resolve(path: &str, signed_in: bool) -> Navigation {
    let path = normalize(path);
    if path == LANDING_PATH {
        Navigation::Render(Page::Landing)
    } else if path.eq_ignore_ascii_case(AUTH_PATH) {
        if signed_in { Navigation::Redirect(DASHBOARD_PATH) } else { Navigation::Render(Page::Auth) }
    } else if is_dashboard(path) {
        if signed_in { Navigation::Render(Page::Dashboard) } else { Navigation::Redirect(AUTH_PATH) }
    } else {
        Navigation::Redirect(LANDING_PATH)
    }
}

fn is_dashboard(path: &str) -> bool {
    let (Some(head), Some(rest)) = (path.get(..DASHBOARD_PATH.len()), path.get(DASHBOARD_PATH.len()..)) else {
        return false;
    };
    head.eq_ignore_ascii_case(DASHBOARD_PATH) && (rest.is_empty() || rest.starts_with('/'))
}

/// Drop query and fragment, and any trailing slash except on the root.
fn normalize(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let path = &path[..end];
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { LANDING_PATH } else { trimmed }
}

#[cfg(test)]
#[path = "routes_test.rs"]
mod tests;
