//! Target resolution: CLI identifiers to a dependency-ordered target set.
//!
//! Grammar: `$all | %<kind> | [@]<name>[:<filter>[:<filter>...]]`. Kinds are
//! case-insensitive, names exact-match. The historical `.`-separated filter
//! form is accepted when an identifier contains no `:`. Unknown identifiers
//! are logged and skipped; they never abort the resolution. The final target
//! order is always the dependency graph's topological order, regardless of
//! the order identifiers were given in.

use indexmap::IndexMap;
use tracing::error;

use super::instances::InstanceFilter;
use super::node::Kind;
use super::registry::NodeRegistry;

/// A resolved node plus a filtered view of which of its instances an
/// operation should affect. Created fresh per operation, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub filter: InstanceFilter,
}

#[derive(Debug, PartialEq, Eq)]
enum Ident {
    All,
    ByKind(Kind),
    ByName { name: String, filters: Vec<String> },
}

fn parse_ident(raw: &str) -> Result<Ident, String> {
    if let Some(rest) = raw.strip_prefix('$') {
        if rest.eq_ignore_ascii_case("all") {
            return Ok(Ident::All);
        }
        return Err(format!("unknown group identifier '{}'", raw));
    }
    if let Some(rest) = raw.strip_prefix('%') {
        return Kind::parse(rest)
            .map(Ident::ByKind)
            .ok_or_else(|| format!("unknown kind identifier '{}'", raw));
    }

    let rest = raw.strip_prefix('@').unwrap_or(raw);
    let separator = if rest.contains(':') { ':' } else { '.' };
    let mut parts = rest.split(separator).map(str::to_string);
    let name = parts.next().unwrap_or_default();
    if name.is_empty() {
        return Err(format!("empty node identifier '{}'", raw));
    }
    let filters: Vec<String> = parts.filter(|f| !f.is_empty()).collect();
    Ok(Ident::ByName { name, filters })
}

/// Resolve identifiers against the registry into a sorted target set.
///
/// No identifiers means `$all`. Re-matching an already-resolved node merges
/// its instance filters into the existing target instead of duplicating it.
pub fn resolve(registry: &NodeRegistry, idents: &[String]) -> Vec<Target> {
    let default_idents = ["$all".to_string()];
    let idents: &[String] = if idents.is_empty() {
        &default_idents
    } else {
        idents
    };

    let mut matched: IndexMap<String, InstanceFilter> = IndexMap::new();

    for raw in idents {
        let ident = match parse_ident(raw) {
            Ok(ident) => ident,
            Err(message) => {
                error!("{}, skipping", message);
                continue;
            }
        };
        match ident {
            Ident::All => {
                for name in registry.names() {
                    matched.entry(name.to_string()).or_default();
                }
            }
            Ident::ByKind(kind) => {
                for node in registry.iter().filter(|n| n.kind == kind) {
                    matched.entry(node.name.clone()).or_default();
                }
            }
            Ident::ByName { name, filters } => {
                if registry.get(&name).is_none() {
                    error!(node = %name, "unknown target node, skipping");
                    continue;
                }
                let filter = matched.entry(name).or_default();
                if !filters.is_empty() {
                    filter.add_filters(filters);
                }
            }
        }
    }

    sort_targets(registry, matched)
}

/// Impose the dependency graph's topological order on the matched set.
fn sort_targets(
    registry: &NodeRegistry,
    mut matched: IndexMap<String, InstanceFilter>,
) -> Vec<Target> {
    let result = registry.dependency_graph().sort();
    let mut targets = Vec::with_capacity(matched.len());
    for name in result.order {
        if let Some(filter) = matched.shift_remove(&name) {
            targets.push(Target { name, filter });
        }
    }
    // Names outside the graph cannot occur: every registered node is a vertex.
    targets
}
