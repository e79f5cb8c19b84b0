//! Neo4j connection management and bundle execution.

use std::collections::HashMap;

use neo4rs::{
    query, BoltBoolean, BoltFloat, BoltInteger, BoltList, BoltNull, BoltString, BoltType,
    ConfigBuilder, Graph,
};
use serde::Deserialize;

use trellis_compiler::{Param, PendingId, StatementBundle};
use trellis_core::{EntityId, Value};

/// Identifiers the store assigned while executing a bundle, keyed by the
/// placeholder of the create statement that produced them. Feed this into
/// the compiled save's commit.
pub type CreatedIds = HashMap<PendingId, EntityId>;

/// Errors from bundle execution.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Neo4j connection error: {0}")]
    Connection(String),

    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("statement references {0} before any statement created it")]
    UnresolvedReference(PendingId),

    #[error("create statement for {0} returned no identifier")]
    MissingCreatedId(PendingId),

    #[error("create statement for {0} returned a malformed identifier: {1}")]
    MalformedCreatedId(PendingId, String),

    #[error("parameter `{0}` holds a non-persistable value; a converter is missing upstream")]
    UnsupportedValue(String),
}

/// Configuration for connecting to Neo4j.
///
/// Loaded from a `trellis.toml` `[neo4j]` section or `TRELLIS__` environment
/// variables, with defaults for local development.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_uri")]
    pub uri: String,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default = "default_password")]
    pub password: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
}

fn default_uri() -> String {
    "bolt://localhost:7687".to_string()
}

fn default_user() -> String {
    "neo4j".to_string()
}

fn default_password() -> String {
    "trellis-dev".to_string()
}

fn default_max_connections() -> u32 {
    16
}

fn default_fetch_size() -> usize {
    256
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            user: default_user(),
            password: default_password(),
            max_connections: default_max_connections(),
            fetch_size: default_fetch_size(),
        }
    }
}

impl GraphConfig {
    /// Load from `<file_prefix>.toml` (optional) layered under `TRELLIS__`
    /// environment variables. Falls back to defaults when neither is
    /// present.
    pub fn load(file_prefix: &str) -> Self {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("TRELLIS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build();

        match cfg {
            Ok(c) => c.get::<GraphConfig>("neo4j").unwrap_or_default(),
            Err(_) => GraphConfig::default(),
        }
    }
}

/// Thread-safe Neo4j client executing statement bundles over Bolt.
///
/// Clone is cheap (inner connection pool is shared). This crate is the only
/// point where trellis touches the network; the compiler never sees it.
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Connect to Neo4j with the given configuration.
    pub async fn connect(config: &GraphConfig) -> Result<Self, GraphError> {
        let neo_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        tracing::info!(uri = %config.uri, "Connected to Neo4j");
        Ok(Self { graph })
    }

    /// Execute a bundle statement by statement, in order.
    ///
    /// Statements marked as creating bind the identifier the store returns
    /// to their placeholder; later statements may reference it. Execution
    /// stops at the first failure.
    pub async fn execute_bundle(&self, bundle: &StatementBundle) -> Result<CreatedIds, GraphError> {
        let mut created = CreatedIds::new();

        for statement in bundle {
            let mut q = query(&statement.text);
            for (name, param) in &statement.params {
                q = q.param(name, bolt_param(name, param, &created)?);
            }

            match statement.creates {
                Some(pending) => {
                    let mut stream = self.graph.execute(q).await?;
                    let row = stream
                        .next()
                        .await?
                        .ok_or(GraphError::MissingCreatedId(pending))?;
                    let id: i64 = row
                        .get("id")
                        .map_err(|e| GraphError::MalformedCreatedId(pending, e.to_string()))?;
                    created.insert(pending, EntityId(id));
                }
                None => self.graph.run(q).await?,
            }
        }

        tracing::debug!(
            statements = bundle.len(),
            created = created.len(),
            "bundle executed"
        );
        Ok(created)
    }

    /// Execute a single read query and collect all rows. Exposed for test
    /// setup and ad-hoc inspection; mapped reads are out of scope here.
    pub async fn query_rows(&self, q: neo4rs::Query) -> Result<Vec<neo4rs::Row>, GraphError> {
        let mut stream = self.graph.execute(q).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Execute a write-only query (cleanup, schema setup).
    pub async fn run(&self, q: neo4rs::Query) -> Result<(), GraphError> {
        self.graph.run(q).await?;
        Ok(())
    }
}

fn bolt_param(name: &str, param: &Param, created: &CreatedIds) -> Result<BoltType, GraphError> {
    match param {
        Param::Value(value) => bolt_value(name, value),
        Param::Id(id) => Ok(BoltType::Integer(BoltInteger::new(id.0))),
        Param::Pending(pending) => created
            .get(pending)
            .map(|id| BoltType::Integer(BoltInteger::new(id.0)))
            .ok_or(GraphError::UnresolvedReference(*pending)),
    }
}

fn bolt_value(name: &str, value: &Value) -> Result<BoltType, GraphError> {
    match value {
        Value::Null => Ok(BoltType::Null(BoltNull)),
        Value::Bool(b) => Ok(BoltType::Boolean(BoltBoolean::new(*b))),
        Value::Int(i) => Ok(BoltType::Integer(BoltInteger::new(*i))),
        Value::Float(x) => Ok(BoltType::Float(BoltFloat::new(*x))),
        Value::String(s) => Ok(BoltType::String(BoltString::new(s))),
        Value::List(items) => {
            let mut list = BoltList::new();
            for item in items {
                list.push(bolt_value(name, item)?);
            }
            Ok(BoltType::List(list))
        }
        // The compiler only parameterizes converted scalars; hitting this
        // means a converter was bypassed.
        Value::DateTime(_) | Value::Uuid(_) => {
            Err(GraphError::UnsupportedValue(name.to_string()))
        }
    }
}
