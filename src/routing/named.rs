//! Named routes and reverse URL generation.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::{PoisonError, RwLock};

use thiserror::Error;

use crate::routing::pattern::{ExpandError, Pattern};
use crate::routing::table::RouteId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    #[error("no route named `{0}`")]
    UnknownRoute(String),

    #[error("route `{route}` needs a value for `{param}`")]
    MissingArgument { route: String, param: String },

    #[error("route `{route}` cannot take an empty value for `{param}`")]
    EmptyArgument { route: String, param: String },

    #[error("route `{route}` takes {expected} argument(s), {given} given")]
    TooManyArguments {
        route: String,
        expected: usize,
        given: usize,
    },
}

/// Name to route id. Entries always point at routes in the table.
#[derive(Default)]
pub struct NamedRoutes {
    names: RwLock<HashMap<String, RouteId>>,
}

impl NamedRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, name: &str, id: RouteId) {
        let previous = self
            .names
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), id);
        if previous.is_some_and(|p| p != id) {
            tracing::warn!(name, "Route name reassigned to a newer route");
        }
    }

    pub fn get(&self, name: &str) -> Option<RouteId> {
        self.names
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
    }

    pub fn len(&self) -> usize {
        self.names.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fill placeholders positionally, in declaration order.
pub fn generate<I>(pattern: &Pattern, name: &str, args: I) -> Result<String, UrlError>
where
    I: IntoIterator,
    I::Item: Display,
{
    let args: Vec<String> = args.into_iter().map(|a| a.to_string()).collect();
    let expected = pattern.params().len();
    if args.len() > expected {
        return Err(UrlError::TooManyArguments {
            route: name.to_string(),
            expected,
            given: args.len(),
        });
    }

    pattern
        .expand(|index, _| args.get(index).cloned())
        .map_err(|err| expand_error(name, err))
}

/// Fill placeholders by parameter name. Keys the pattern does not use are
/// ignored.
pub fn generate_with<I, K, V>(pattern: &Pattern, name: &str, pairs: I) -> Result<String, UrlError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Display,
{
    let values: HashMap<String, String> = pairs
        .into_iter()
        .map(|(k, v)| (k.as_ref().to_string(), v.to_string()))
        .collect();

    pattern
        .expand(|_, param| values.get(param).cloned())
        .map_err(|err| expand_error(name, err))
}

fn expand_error(route: &str, err: ExpandError) -> UrlError {
    let route = route.to_string();
    match err {
        ExpandError::Missing(param) => UrlError::MissingArgument { route, param },
        ExpandError::Empty(param) => UrlError::EmptyArgument { route, param },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(template: &str) -> Pattern {
        Pattern::parse(template).unwrap()
    }

    #[test]
    fn test_positional() {
        let p = pattern("/users/:id/posts/:postId");
        assert_eq!(generate(&p, "post", [123, 456]).unwrap(), "/users/123/posts/456");
    }

    #[test]
    fn test_missing_argument_is_error() {
        let p = pattern("/users/:id/posts/:postId");
        assert_eq!(
            generate(&p, "post", [123]).unwrap_err(),
            UrlError::MissingArgument {
                route: "post".into(),
                param: "postId".into()
            }
        );
    }

    #[test]
    fn test_empty_parameter_value_is_error() {
        let p = pattern("/users/:id");
        assert_eq!(
            generate(&p, "user", [""]).unwrap_err(),
            UrlError::EmptyArgument {
                route: "user".into(),
                param: "id".into()
            }
        );
        assert!(matches!(
            generate_with(&p, "user", [("id", "")]),
            Err(UrlError::EmptyArgument { .. })
        ));
    }

    #[test]
    fn test_values_are_escaped() {
        let p = pattern("/users/:id");
        assert_eq!(generate(&p, "user", ["a/b"]).unwrap(), "/users/a%2Fb");
        assert_eq!(generate(&p, "user", ["a b"]).unwrap(), "/users/a%20b");
    }

    #[test]
    fn test_too_many_arguments() {
        let p = pattern("/users/:id");
        assert_eq!(
            generate(&p, "user", ["1", "2"]).unwrap_err(),
            UrlError::TooManyArguments {
                route: "user".into(),
                expected: 1,
                given: 2
            }
        );
    }

    #[test]
    fn test_static_and_wildcard() {
        assert_eq!(generate(&pattern("/about"), "about", Vec::<u8>::new()).unwrap(), "/about");
        assert_eq!(generate(&pattern("/"), "home", Vec::<u8>::new()).unwrap(), "/");
        assert_eq!(
            generate(&pattern("/docs/*path"), "docs", ["guide/intro"]).unwrap(),
            "/docs/guide/intro"
        );
    }

    #[test]
    fn test_by_name_ignores_extra_keys() {
        let p = pattern("/users/:id/posts/:postId");
        let url =
            generate_with(&p, "post", [("postId", "9"), ("id", "3"), ("unused", "x")]).unwrap();
        assert_eq!(url, "/users/3/posts/9");

        let err = generate_with(&p, "post", [("id", "3")]).unwrap_err();
        assert!(matches!(err, UrlError::MissingArgument { param, .. } if param == "postId"));
    }
}
