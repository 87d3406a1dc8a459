use crate::sync::{Lock, LockEx};

/// The names currently being constructed, shared by both layers of an
/// injector. The most recent request is stored last.
pub(crate) struct RequestPath {
    names: Lock<Vec<String>>,
}

impl RequestPath {
    pub fn new() -> Self {
        RequestPath {
            names: Lock::new(Vec::new()),
        }
    }

    /// Pushes a name for as long as the returned guard lives.
    pub fn enter(&self, name: &str) -> PathGuard<'_> {
        self.names.with_inner_mut(|names| names.push(name.to_owned()));
        PathGuard { path: self }
    }

    /// The path, most recent request first.
    pub fn render(&self) -> Vec<String> {
        self.names
            .with_inner(|names| names.iter().rev().cloned().collect())
    }

    /// The path of a request for `name` that is already in progress.
    pub fn cycle(&self, name: &str) -> Vec<String> {
        let mut path = vec![name.to_owned()];
        path.extend(self.render());
        path
    }

    /// The path of a request that has no provider, followed by the caller
    /// if it is not already part of the path.
    pub fn unknown(&self, caller: Option<&str>) -> Vec<String> {
        let mut path = self.render();
        if let Some(caller) = caller {
            if !path.iter().any(|name| name == caller) {
                path.push(caller.to_owned());
            }
        }
        path
    }
}

/// Pops the most recent name from the path when dropped.
pub(crate) struct PathGuard<'a> {
    path: &'a RequestPath,
}

impl Drop for PathGuard<'_> {
    fn drop(&mut self) {
        self.path.names.with_inner_mut(|names| {
            names.pop();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_pop_in_reverse_order() {
        let path = RequestPath::new();
        {
            let _b = path.enter("b");
            let _a = path.enter("a");
            assert_eq!(vec!["a", "b"], path.render());
            assert_eq!(vec!["b", "a", "b"], path.cycle("b"));
        }
        assert!(path.render().is_empty());
    }

    #[test]
    fn unknown_appends_new_callers_only() {
        let path = RequestPath::new();
        let _a = path.enter("a");
        let _x = path.enter("xProvider");
        assert_eq!(vec!["xProvider", "a"], path.unknown(Some("a")));
        assert_eq!(vec!["xProvider", "a", "caller"], path.unknown(Some("caller")));
        assert_eq!(vec!["xProvider", "a"], path.unknown(None));
    }
}
