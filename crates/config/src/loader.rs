use std::{collections::BTreeMap, fmt::Write, path::Path, str::FromStr};

use anyhow::bail;
use indoc::formatdoc;
use serde::Deserialize;
use serde_dynamic_string::DynamicString;
use toml::Value;

use crate::Config;

pub(crate) fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())?;
    parse(&content)
}

pub(crate) fn parse(content: &str) -> anyhow::Result<Config> {
    let mut raw_config: Value = toml::from_str(content)?;
    expand_dynamic_strings(&mut Vec::new(), &mut raw_config)?;

    let config = Config::deserialize(raw_config)?;
    validate_routes(&config)?;

    Ok(config)
}

fn expand_dynamic_strings<'a>(path: &mut Vec<Result<&'a str, usize>>, value: &'a mut Value) -> anyhow::Result<()> {
    match value {
        Value::String(s) => match DynamicString::<String>::from_str(s) {
            Ok(out) => *s = out.into_inner(),
            Err(err) => {
                let mut p = String::new();
                for segment in path {
                    match segment {
                        Ok(s) => {
                            p.push_str(s);
                            p.push('.');
                        }
                        Err(i) => write!(p, "[{i}]")?,
                    }
                }
                if p.ends_with('.') {
                    p.pop();
                }

                bail!("Failed to expand dynamic string at path '{p}': {err}");
            }
        },
        Value::Array(values) => {
            for (i, value) in values.iter_mut().enumerate() {
                path.push(Err(i));
                expand_dynamic_strings(path, value)?;
                path.pop();
            }
        }
        Value::Table(map) => {
            for (key, value) in map {
                path.push(Ok(key.as_str()));
                expand_dynamic_strings(path, value)?;
                path.pop();
            }
        }
        Value::Integer(_) | Value::Float(_) | Value::Boolean(_) | Value::Datetime(_) => (),
    }

    Ok(())
}

/// Rejects statically configured routes that can never be enforced.
pub(crate) fn validate_routes(config: &Config) -> anyhow::Result<()> {
    for (index, route) in config.limiter.routes.iter().enumerate() {
        if route.route.is_empty() {
            bail!("limiter.routes[{index}] has an empty route name");
        }

        if route.threshold == 0 {
            bail!("Route '{}' must have a threshold greater than zero", route.route);
        }

        if route.window.as_secs() == 0 || route.window.subsec_nanos() != 0 {
            bail!(formatdoc! {r#"
                Route '{}' has a window of {:?}, but windows must be a whole number of seconds and at least one second.

                Example configuration:

                  [[limiter.routes]]
                  route = "{}"
                  threshold = {}
                  window = "60s"
            "#, route.route, route.window, route.route, route.threshold});
        }
    }

    Ok(())
}

/// Warnings for routes configured more than once. The first definition wins.
pub(crate) fn duplicate_routes(config: &Config) -> Vec<String> {
    let mut warnings = Vec::new();
    let mut seen = BTreeMap::new();

    for (index, route) in config.limiter.routes.iter().enumerate() {
        match seen.get(route.route.as_str()) {
            Some(first) => warnings.push(format!(
                "Route '{}' is configured more than once; keeping the first definition at limiter.routes[{first}]",
                route.route
            )),
            None => {
                seen.insert(route.route.as_str(), index);
            }
        }
    }

    warnings
}
