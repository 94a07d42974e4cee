use std::collections::HashMap;
use std::fmt;

use tracing::{debug, info, warn};

use crate::adapter::SchemaAdapter;
use crate::catalog::SchemaCatalog;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::interpolate::{variable_namespace, Interpolator};
use crate::object::{Direction, ObjectId, SchemaObject};
use crate::resolver::DependencyResolver;
use crate::script::{Script, ScriptLocator, ScriptSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Resolving,
    Locating,
    Interpolating,
    Executing,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Resolving => "resolving",
            RunState::Locating => "locating",
            RunState::Interpolating => "interpolating",
            RunState::Executing => "executing",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What happened to one object during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectOutcome {
    pub object: ObjectId,
    pub source: ScriptSource,
    /// Rows returned by the script, if any.
    pub rows: usize,
}

/// Runs schema objects' scripts against one adapter, in dependency order.
///
/// A run moves through `Resolving`, `Locating`, `Interpolating` and
/// `Executing`. Everything up to `Executing` is validation and issues no
/// change SQL, so a bad request leaves the database untouched. Once
/// execution starts the first failure stops the run and is reported
/// together with the objects that already went through.
///
/// The engine opens no transaction of its own. Callers that want a run to
/// be atomic wrap it in [`SchemaAdapter::begin`] / [`SchemaAdapter::commit`]
/// or savepoints, after checking the backend supports transactional DDL.
pub struct ExecutionEngine<'a> {
    adapter: &'a mut dyn SchemaAdapter,
    catalog: &'a SchemaCatalog,
    locator: &'a dyn ScriptLocator,
    interpolator: Interpolator,
    vars: HashMap<String, String>,
    state: RunState,
}

impl<'a> ExecutionEngine<'a> {
    pub fn new(
        adapter: &'a mut dyn SchemaAdapter,
        catalog: &'a SchemaCatalog,
        locator: &'a dyn ScriptLocator,
    ) -> Self {
        Self {
            adapter,
            catalog,
            locator,
            interpolator: Interpolator::new(),
            vars: HashMap::new(),
            state: RunState::Idle,
        }
    }

    /// Take the sentinel and variables from project settings.
    pub fn with_settings(mut self, settings: &Settings) -> Self {
        self.interpolator = Interpolator::with_sentinel(settings.interpolation_sentinel);
        self.vars.extend(settings.vars.clone());
        self
    }

    pub fn with_interpolator(mut self, interpolator: Interpolator) -> Self {
        self.interpolator = interpolator;
        self
    }

    pub fn var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn vars(mut self, vars: HashMap<String, String>) -> Self {
        self.vars.extend(vars);
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// The connection the engine runs on, for transaction and savepoint
    /// control around runs.
    pub fn adapter(&mut self) -> &mut dyn SchemaAdapter {
        &mut *self.adapter
    }

    /// The order `run` would process `requested` in. Touches no connection.
    pub fn plan(&self, requested: &[ObjectId], direction: Direction) -> Result<Vec<ObjectId>> {
        Ok(self
            .ordered(requested, direction)?
            .into_iter()
            .map(SchemaObject::id)
            .collect())
    }

    /// Run objects named `kind:name` or by a unique bare name.
    pub fn run_named(&mut self, requests: &[&str], direction: Direction) -> Result<Vec<ObjectOutcome>> {
        let requested = requests
            .iter()
            .map(|request| self.catalog.find(request).map(SchemaObject::id))
            .collect::<Result<Vec<_>>>()?;
        self.run(&requested, direction)
    }

    pub fn run(&mut self, requested: &[ObjectId], direction: Direction) -> Result<Vec<ObjectOutcome>> {
        info!(
            backend = self.adapter.backend().name(),
            direction = %direction,
            objects = requested.len(),
            "run started"
        );
        match self.run_phases(requested, direction) {
            Ok(outcomes) => {
                self.transition(RunState::Done);
                info!(direction = %direction, processed = outcomes.len(), "run finished");
                Ok(outcomes)
            }
            Err(e) => {
                self.transition(RunState::Failed);
                warn!(direction = %direction, error = %e, "run failed");
                Err(e)
            }
        }
    }

    fn run_phases(&mut self, requested: &[ObjectId], direction: Direction) -> Result<Vec<ObjectOutcome>> {
        self.transition(RunState::Resolving);
        let order = self.ordered(requested, direction)?;

        self.transition(RunState::Locating);
        let mut scripts = Vec::with_capacity(order.len());
        for object in order {
            scripts.push(self.locate(object, direction)?);
        }

        self.transition(RunState::Interpolating);
        self.interpolate(&mut scripts)?;

        self.transition(RunState::Executing);
        self.execute(scripts)
    }

    /// Gate every requested kind on the backend, then resolve.
    fn ordered(&self, requested: &[ObjectId], direction: Direction) -> Result<Vec<&'a SchemaObject>> {
        let capabilities = self.adapter.capabilities();
        for id in requested {
            let object = self
                .catalog
                .get(id)
                .ok_or_else(|| Error::UnknownObject(id.to_string()))?;
            capabilities.check(object)?;
        }
        DependencyResolver::new(self.catalog).resolve(requested, direction)
    }

    fn locate(&mut self, object: &SchemaObject, direction: Direction) -> Result<Script> {
        let script = Script::new(object.clone(), direction);
        let found = self
            .locator
            .locate(object, direction)
            .map_err(|e| script_error(object.id(), direction, e))?;
        match found {
            Some(content) => Ok(script.stored(content)),
            None if direction == Direction::Revert => {
                let drop = self.adapter.synthesize_drop(object)?;
                debug!(object = %object.id(), sql = %drop, "no revert script, synthesized drop");
                Ok(script.synthesized(drop))
            }
            None => Err(Error::MissingScript {
                object: object.id(),
                direction,
            }),
        }
    }

    /// Resolve every script before any runs. The current database is only
    /// asked for when a script uses it and the caller did not supply it.
    fn interpolate(&mut self, scripts: &mut [Script]) -> Result<()> {
        let wants_database = !self.vars.contains_key("database")
            && scripts.iter().any(|script| {
                script
                    .raw_content
                    .as_deref()
                    .is_some_and(|sql| self.interpolator.tokens(sql).contains(&"database"))
            });
        let database = if wants_database {
            self.adapter.current_database()?
        } else {
            String::new()
        };
        let namespace = variable_namespace(&database, &self.vars);

        for script in scripts.iter_mut() {
            if let Some(raw) = &script.raw_content {
                let resolved = self
                    .interpolator
                    .interpolate(raw, &namespace)
                    .map_err(|e| script_error(script.id(), script.direction, e))?;
                script.resolved_sql = Some(resolved);
            }
        }
        Ok(())
    }

    fn execute(&mut self, scripts: Vec<Script>) -> Result<Vec<ObjectOutcome>> {
        let mut outcomes: Vec<ObjectOutcome> = Vec::with_capacity(scripts.len());

        for script in scripts {
            let object = script.id();
            match self.execute_one(&script) {
                Ok(outcome) => {
                    debug!(object = %object, source = %outcome.source, "object done");
                    outcomes.push(outcome);
                }
                Err(e) => {
                    return Err(Error::RunFailed {
                        object,
                        completed: outcomes.into_iter().map(|o| o.object).collect(),
                        source: Box::new(e),
                    });
                }
            }
        }

        Ok(outcomes)
    }

    fn execute_one(&mut self, script: &Script) -> Result<ObjectOutcome> {
        let object = &script.object;
        let backend = self.adapter.backend();

        if script.source == ScriptSource::Synthesized
            && !backend.drop_is_guarded(object.kind)
            && !self.adapter.exists(object)?
        {
            debug!(object = %object.id(), "already absent, skipping drop");
            return Ok(ObjectOutcome {
                object: object.id(),
                source: ScriptSource::Skipped,
                rows: 0,
            });
        }

        let sql = script.resolved_sql.as_deref().unwrap_or_default();
        let rows = self.adapter.execute(sql, &script.label())?;
        Ok(ObjectOutcome {
            object: object.id(),
            source: script.source,
            rows: rows.len(),
        })
    }

    fn transition(&mut self, state: RunState) {
        debug!(from = %self.state, to = %state, "run state");
        self.state = state;
    }
}

fn script_error(object: ObjectId, direction: Direction, source: Error) -> Error {
    Error::Script {
        object,
        direction,
        source: Box::new(source),
    }
}
