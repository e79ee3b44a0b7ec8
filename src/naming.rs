//! Stable, human-readable names for registered handlers.
//!
//! Names come from [`std::any::type_name`] of the handler type, recorded once
//! per distinct type when the route is registered:
//!
//! | Handler | Name |
//! |---|---|
//! | `fn hello(..)` in `app::routes` | `app::routes::hello` |
//! | first closure in `app::main` | `app::main::{{closure}}#1` |
//! | second closure in `app::main` | `app::main::{{closure}}#2` |
//! | function pointer / trait object | `unnamed handler#N` |
//!
//! Every closure has its own type, so a closure registered twice keeps its
//! number, and two closures in the same scope never share one.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::context::Context;

/// Placeholder used when a handler's identity cannot be determined.
pub const UNNAMED_HANDLER: &str = "unnamed handler";

/// Registration-time table from handler type to name.
#[derive(Default)]
pub(crate) struct HandlerNames {
    by_type: HashMap<TypeId, Arc<str>>,
    seen: HashMap<String, usize>,
    unnamed: usize,
}

impl HandlerNames {
    pub(crate) fn resolve(&mut self, id: TypeId, type_name: &str) -> Arc<str> {
        if let Some(name) = self.by_type.get(&id) {
            return Arc::clone(name);
        }

        // Function pointers and trait objects share one TypeId across
        // unrelated handlers, so they are numbered per registration instead.
        if !is_nameable(type_name) {
            self.unnamed += 1;
            return format!("{UNNAMED_HANDLER}#{}", self.unnamed).into();
        }

        let seen = self.seen.entry(type_name.to_owned()).or_default();
        *seen += 1;
        let name: Arc<str> = if type_name.contains("{{closure}}") || *seen > 1 {
            format!("{type_name}#{seen}").into()
        } else {
            type_name.into()
        };
        self.by_type.insert(id, Arc::clone(&name));
        name
    }
}

fn is_nameable(type_name: &str) -> bool {
    !type_name.is_empty()
        && !type_name.starts_with(['&', '*', '(', '['])
        && !type_name.starts_with("fn(")
        && !type_name.contains("dyn ")
}

/// How transactions are named.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Naming {
    /// `"<METHOD> <handler name>"`, e.g. `GET app::routes::hello`.
    #[default]
    Handler,
    /// `"<METHOD> <route pattern>"`, e.g. `GET /users/{id}`.
    Route,
}

impl Naming {
    /// Builds the transaction name from the current state of `ctx`.
    pub(crate) fn transaction_name(self, ctx: &Context) -> String {
        let method = ctx.request().method();
        match self {
            Self::Handler => {
                format!("{method} {}", ctx.handler_name().unwrap_or(UNNAMED_HANDLER))
            }
            Self::Route => match ctx.route() {
                Some(route) => format!("{method} {}", route.pattern()),
                None => format!("{method} NotFound"),
            },
        }
    }
}

impl FromStr for Naming {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "handler" => Ok(Self::Handler),
            "route" => Ok(Self::Route),
            other => Err(format!("unknown naming strategy `{other}`")),
        }
    }
}

impl fmt::Display for Naming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Handler => "handler",
            Self::Route => "route",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::type_name;

    fn resolve<T: 'static>(names: &mut HandlerNames, _: &T) -> Arc<str> {
        names.resolve(TypeId::of::<T>(), type_name::<T>())
    }

    fn hello() {}
    fn goodbye() {}

    #[test]
    fn named_functions_keep_their_path() {
        let mut names = HandlerNames::default();
        assert_eq!(&*resolve(&mut names, &hello), "tsu_apm::naming::tests::hello");
        assert_eq!(&*resolve(&mut names, &goodbye), "tsu_apm::naming::tests::goodbye");
    }

    #[test]
    fn closures_are_numbered_and_stable() {
        let mut names = HandlerNames::default();
        let first = || 1;
        let second = || 2;

        let a = resolve(&mut names, &first);
        let b = resolve(&mut names, &second);
        let again = resolve(&mut names, &first);

        assert_eq!(
            &*a,
            "tsu_apm::naming::tests::closures_are_numbered_and_stable::{{closure}}#1"
        );
        assert_ne!(a, b);
        assert_eq!(a, again);
    }

    #[test]
    fn function_pointers_degrade_to_unnamed() {
        let mut names = HandlerNames::default();
        let f: fn() = hello;
        let g: fn() = goodbye;

        let a = resolve(&mut names, &f);
        let b = resolve(&mut names, &g);
        assert_eq!(&*a, "unnamed handler#1");
        assert_eq!(&*b, "unnamed handler#2");
    }

    #[test]
    fn naming_parses_case_insensitively() {
        assert_eq!(" Route ".parse::<Naming>(), Ok(Naming::Route));
        assert_eq!("handler".parse::<Naming>(), Ok(Naming::Handler));
        assert!("path".parse::<Naming>().is_err());
    }
}
