//! Session-level glue: the system variables store and the per-connection
//! cursor that carries parameters through to the rewriter (§5, §6).

use std::collections::HashMap;

use opteryx_error::{OpteryxError, Result};
use opteryx_types::Value;

use crate::rewrite::ast_rewriter::ParameterSet;

/// One entry in the variables store, tracking who's allowed to write it.
#[derive(Debug, Clone)]
struct Variable {
    value: Value,
    server_owned: bool,
}

/// The system variables store, partitioned into server-owned and
/// user-owned entries. User code may only mutate user-owned entries;
/// attempting to mutate a server-owned one is a [`OpteryxError::permissions`]
/// error. Each connection works from its own deep-copied snapshot.
#[derive(Debug, Clone, Default)]
pub struct SystemVariables {
    entries: HashMap<String, Variable>,
}

impl SystemVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a server-owned variable. Only the engine itself calls this --
    /// never exposed to user code.
    pub fn set_server(&mut self, name: impl Into<String>, value: Value) {
        self.entries.insert(name.into(), Variable { value, server_owned: true });
    }

    /// Seed or overwrite a user-owned variable, bypassing the ownership
    /// check. Used to populate defaults before a connection is handed out.
    pub fn set_user(&mut self, name: impl Into<String>, value: Value) {
        self.entries.insert(name.into(), Variable { value, server_owned: false });
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name).map(|v| &v.value)
    }

    /// User-code entry point: `SET name = value`. Rejects server-owned
    /// names and creates new user-owned ones on first write.
    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        if let Some(existing) = self.entries.get(name) {
            if existing.server_owned {
                return Err(OpteryxError::permissions(format!(
                    "variable '{name}' is server-owned and cannot be modified"
                )));
            }
        }
        self.entries
            .entry(name.to_string())
            .and_modify(|v| v.value = value.clone())
            .or_insert(Variable { value, server_owned: false });
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// A deep-copied snapshot handed to a new connection.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }
}

/// A single connection's state: its deep-copied variables snapshot and the
/// parameters supplied for the query currently being compiled.
#[derive(Debug, Clone)]
pub struct Session {
    variables: SystemVariables,
    parameters: ParameterSet,
    batched: bool,
}

impl Session {
    pub fn new(server_variables: &SystemVariables) -> Self {
        Session {
            variables: server_variables.snapshot(),
            parameters: ParameterSet::None,
            batched: false,
        }
    }

    pub fn variables(&self) -> &SystemVariables {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut SystemVariables {
        &mut self.variables
    }

    /// Mark whether the SQL text being compiled is a batched (multi-
    /// statement) query -- positional parameters are rejected against one.
    pub fn set_batched(&mut self, batched: bool) {
        self.batched = batched;
    }

    /// Ingest query parameters. Positional parameters against a batched
    /// query is a [`OpteryxError::parameter`] error; beyond that, ingestion
    /// is just a move -- mutual exclusivity between positional and named is
    /// already enforced by [`ParameterSet`]'s shape.
    pub fn set_parameters(&mut self, parameters: ParameterSet) -> Result<()> {
        if self.batched && matches!(parameters, ParameterSet::Positional(_)) {
            return Err(OpteryxError::parameter(
                "positional parameters are not supported for batched queries",
            ));
        }
        self.parameters = parameters;
        Ok(())
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_owned_variable_can_be_overwritten() {
        let mut vars = SystemVariables::new();
        vars.set_user("search_path", Value::Varchar("public".to_string()));
        vars.set("search_path", Value::Varchar("other".to_string())).unwrap();
        assert_eq!(vars.get("search_path"), Some(&Value::Varchar("other".to_string())));
    }

    #[test]
    fn server_owned_variable_rejects_user_writes() {
        let mut vars = SystemVariables::new();
        vars.set_server("version", Value::Varchar("1.0".to_string()));
        let err = vars.set("version", Value::Varchar("2.0".to_string())).unwrap_err();
        assert_eq!(err.kind, opteryx_error::ErrorKind::Permissions);
    }

    #[test]
    fn snapshot_is_independent_of_the_server_store() {
        let mut server = SystemVariables::new();
        server.set_user("x", Value::Integer(1));
        let mut session = Session::new(&server);
        session.variables_mut().set("x", Value::Integer(2)).unwrap();
        assert_eq!(server.get("x"), Some(&Value::Integer(1)));
    }

    #[test]
    fn batched_query_rejects_positional_parameters() {
        let server = SystemVariables::new();
        let mut session = Session::new(&server);
        session.set_batched(true);
        let err = session
            .set_parameters(ParameterSet::Positional(vec![Value::Integer(1)]))
            .unwrap_err();
        assert_eq!(err.kind, opteryx_error::ErrorKind::Parameter);
    }
}
