//! Request URI construction from base URL, route template and parameters.

use url::Url;
use url::form_urlencoded::byte_serialize;

use crate::error::ContractError;

/// Joins `base_url` and `template`, substitutes `{name}` placeholders from
/// `path_params` and appends `query` in order.
///
/// Trailing `/` on the base and leading `/` on the template are collapsed
/// into a single separator. A template that is already an absolute URL is
/// used as-is.
pub fn build_url(
    base_url: Option<&str>,
    template: &str,
    path_params: &[(String, String)],
    query: &[(String, String)],
) -> Result<Url, ContractError> {
    let route = substitute(template, path_params)?;

    let joined = if is_absolute(&route) {
        route
    } else {
        match base_url {
            Some(base) => format!(
                "{}/{}",
                base.trim_end_matches('/'),
                route.trim_start_matches('/')
            ),
            None => route,
        }
    };

    let mut url = Url::parse(&joined).map_err(|e| ContractError::InvalidRoute {
        route: joined.clone(),
        reason: e.to_string(),
    })?;

    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in query {
            pairs.append_pair(name, value);
        }
    }
    Ok(url)
}

fn is_absolute(route: &str) -> bool {
    route.starts_with("http://") || route.starts_with("https://")
}

fn substitute(template: &str, params: &[(String, String)]) -> Result<String, ContractError> {
    let invalid = |reason: String| ContractError::InvalidRoute {
        route: template.to_string(),
        reason,
    };

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after
            .find('}')
            .ok_or_else(|| invalid("unterminated placeholder".to_string()))?;
        let name = &after[..end];
        if name.is_empty() {
            return Err(invalid("empty placeholder".to_string()));
        }
        let value = params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| invalid(format!("no value for placeholder '{}'", name)))?;
        out.push_str(&encode_segment(value));
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn encode_segment(value: &str) -> String {
    byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
