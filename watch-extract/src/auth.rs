use crate::PageSurface;

/// DOM signatures that mean the viewer landed on a credential wall
/// instead of the profile. Probed before any extraction chain runs so
/// a walled page never reads as an empty profile.
const AUTH_WALL_PROBES: [(&str, &str, &str); 2] = [
    ("input[name='password']", "name", "password input"),
    ("form#loginForm", "id", "login form"),
];

/// Path segments a logged-out redirect lands on, most specific first.
const LOGIN_PATH_PREFIXES: [&str; 2] = ["/accounts/login", "/login"];

/// Probe for a login wall. Returns the matched signature, if any.
/// The DOM is checked first, then the address the navigation landed
/// on. Probe errors count as "no wall seen"; the chains decide what
/// an unreadable page means.
pub async fn detect_auth_wall(surface: &dyn PageSurface) -> Option<String> {
    for (selector, attr, signature) in AUTH_WALL_PROBES {
        match surface.attr_first(selector, attr).await {
            Ok(Some(_)) => {
                log::warn!("authentication wall detected: {signature}");
                return Some(signature.to_string());
            }
            Ok(None) => {}
            Err(err) => log::debug!("auth probe {selector} failed: {err}"),
        }
    }
    match surface.current_url().await {
        Ok(url) if is_login_path(url.path()) => {
            log::warn!("authentication wall detected: landed on {}", url.path());
            Some("login path".to_string())
        }
        Ok(_) => None,
        Err(err) => {
            log::debug!("landing url check failed: {err}");
            None
        }
    }
}

/// Whole-segment prefix match, so a profile named "loginns" never
/// reads as a wall.
fn is_login_path(path: &str) -> bool {
    LOGIN_PATH_PREFIXES.iter().any(|prefix| {
        path.strip_prefix(prefix)
            .map_or(false, |rest| rest.is_empty() || rest.starts_with('/'))
    })
}
