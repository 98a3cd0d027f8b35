use crate::{emit_success, OutputMode, Settings, TypeKind};
use anyhow::Context;
use manuscript::config::{self, ManuscriptConfig};
use manuscript::ui::{
    self, dim, kind_label, muted, stats_table, status, success, summary_row, tree_line,
    types_table, Icons, TypeRow,
};
use manuscript::{
    AnyNode, ElementRef, ElementTypeRef, FieldRef, FieldTypeRef, Storage, ValueKind, ValueRef,
    ValueTypeRef,
};
use owo_colors::OwoColorize;
use serde_json::json;
use std::path::Path;
use std::str::FromStr;

fn open_storage(settings: &Settings) -> anyhow::Result<Storage> {
    config::ensure_db_dir(&settings.database)?;
    let storage = Storage::open(&settings.database)
        .with_context(|| format!("failed to open {}", settings.database.display()))?;
    if let Some(author) = &settings.author {
        storage.set_author(author.as_str());
    }
    Ok(storage)
}

pub fn run_init(
    output_mode: OutputMode,
    settings: &Settings,
    author: Option<String>,
    config_path: Option<&Path>,
    force: bool,
) -> anyhow::Result<()> {
    let author = author.or_else(|| settings.author.clone());
    if let Some(path) = config_path {
        let config = ManuscriptConfig {
            database: Some(settings.database.display().to_string()),
            author: author.clone(),
        };
        config::write_config(path, &config, force)?;
    }

    let storage = open_storage(&Settings {
        database: settings.database.clone(),
        author,
    })?;
    let project = storage.project()?;

    if output_mode.is_human() {
        success(&format!("Project '{}' ready", project.name()));
        status(Icons::DATABASE, "Database", &settings.database.display().to_string());
        status(Icons::PERSON, "Author", &storage.author());
        summary_row("Project id:", &project.id().to_string());
        if let Some(path) = config_path {
            summary_row("Config:", &path.display().to_string());
        }
    } else {
        emit_success(
            output_mode,
            "init",
            json!({
                "database": settings.database.display().to_string(),
                "project": { "id": project.id(), "name": project.name() },
                "config": config_path.map(|p| p.display().to_string()),
            }),
        )?;
    }
    Ok(())
}

pub fn run_stats(output_mode: OutputMode, settings: &Settings) -> anyhow::Result<()> {
    let storage = open_storage(settings)?;
    let stats = storage.stats()?;

    if output_mode.is_human() {
        status(Icons::STATS, "Statistics", &stats.database);
        println!("{}", stats_table(&stats.rows()));
        summary_row("Total:", &stats.total().to_string());
    } else {
        emit_success(output_mode, "stats", serde_json::to_value(&stats)?)?;
    }
    Ok(())
}

fn names<T: manuscript::Node + 'static>(nodes: &[manuscript::Handle<T>]) -> Vec<String> {
    nodes.iter().map(|n| n.name()).collect()
}

fn kind_names(kinds: &[ValueKind]) -> Vec<&'static str> {
    kinds.iter().map(ValueKind::as_str).collect()
}

fn occurs(min: i32, max: i32) -> String {
    if max < 0 {
        format!("{}..*", min)
    } else {
        format!("{}..{}", min, max)
    }
}

fn element_type_row(t: &ElementTypeRef) -> TypeRow {
    TypeRow {
        id: t.id(),
        kind: t.kind().to_string(),
        name: t.name(),
        children: names(&t.field_types()).join(", "),
        constraints: String::new(),
    }
}

fn field_type_row(t: &FieldTypeRef) -> TypeRow {
    let mut constraints = occurs(t.min_occurs(), t.max_occurs());
    let allowed = kind_names(&t.allowed_types());
    if !allowed.is_empty() {
        constraints.push_str(&format!(" [{}]", allowed.join(", ")));
    }
    TypeRow {
        id: t.id(),
        kind: t.kind().to_string(),
        name: t.name(),
        children: names(&t.value_types()).join(", "),
        constraints,
    }
}

fn value_type_row(t: &ValueTypeRef) -> TypeRow {
    TypeRow {
        id: t.id(),
        kind: t.kind().to_string(),
        name: t.name(),
        children: String::new(),
        constraints: String::new(),
    }
}

pub fn run_types(output_mode: OutputMode, settings: &Settings) -> anyhow::Result<()> {
    let storage = open_storage(settings)?;
    let project_types = storage.all_project_types();
    let element_types = storage.all_element_types();
    let field_types = storage.all_field_types();
    let value_types = storage.all_value_types();

    if output_mode.is_human() {
        let rows: Vec<TypeRow> = project_types
            .iter()
            .chain(&element_types)
            .map(element_type_row)
            .chain(field_types.iter().map(field_type_row))
            .chain(value_types.iter().map(value_type_row))
            .collect();
        if rows.is_empty() {
            println!("{}", muted("No types defined"));
        } else {
            ui::header("Schema");
            println!("{}", types_table(&rows));
        }
    } else {
        let data = json!({
            "project_types": project_types.iter().map(element_type_json).collect::<Vec<_>>(),
            "element_types": element_types.iter().map(element_type_json).collect::<Vec<_>>(),
            "field_types": field_types.iter().map(field_type_json).collect::<Vec<_>>(),
            "value_types": value_types.iter().map(value_type_json).collect::<Vec<_>>(),
        });
        emit_success(output_mode, "types", data)?;
    }
    Ok(())
}

/// Arguments of `add-type`
pub struct NewType {
    pub kind: TypeKind,
    pub name: String,
    pub children: Vec<String>,
    pub allowed: Vec<String>,
    pub min: Option<i32>,
    pub max: Option<i32>,
}

fn lookup<T>(
    children: &[String],
    find: impl Fn(&str) -> Option<T>,
    what: &str,
) -> anyhow::Result<Vec<T>> {
    children
        .iter()
        .map(|name| find(name).with_context(|| format!("no {} named '{}'", what, name)))
        .collect()
}

pub fn run_add_type(
    output_mode: OutputMode,
    settings: &Settings,
    new: NewType,
) -> anyhow::Result<()> {
    let storage = open_storage(settings)?;
    let constrained = !new.allowed.is_empty() || new.min.is_some() || new.max.is_some();
    if new.kind != TypeKind::Field && constrained {
        anyhow::bail!("--allowed, --min and --max only apply to field types");
    }

    let node: AnyNode = match new.kind {
        TypeKind::Element | TypeKind::Project => {
            let field_types =
                lookup(&new.children, |n| storage.field_type_by_name(n), "field type")?;
            let created = if new.kind == TypeKind::Project {
                storage.create_project_type(&new.name)?
            } else {
                storage.create_element_type(&new.name)?
            };
            created.set_field_types(field_types);
            storage.save(&created, false)?;
            created.into()
        }
        TypeKind::Field => {
            let value_types =
                lookup(&new.children, |n| storage.value_type_by_name(n), "value type")?;
            let allowed = new
                .allowed
                .iter()
                .map(|k| ValueKind::from_str(k))
                .collect::<manuscript::Result<Vec<_>>>()?;
            let created = storage.create_field_type(&new.name)?;
            created.set_value_types(value_types);
            created.set_allowed_types(allowed);
            if let Some(min) = new.min {
                created.set_min_occurs(min);
            }
            if let Some(max) = new.max {
                created.set_max_occurs(max);
            }
            storage.save(&created, false)?;
            created.into()
        }
        TypeKind::Value => {
            if !new.children.is_empty() {
                anyhow::bail!("value types have no children");
            }
            storage.create_value_type(&new.name)?.into()
        }
    };

    if output_mode.is_human() {
        success(&format!("Created {} '{}' (#{})", node.kind(), node.name(), node.id()));
    } else {
        emit_success(output_mode, "add-type", node_json(&node))?;
    }
    Ok(())
}

pub fn run_show(output_mode: OutputMode, settings: &Settings, id: i64) -> anyhow::Result<()> {
    let storage = open_storage(settings)?;
    let node = storage.load_any(id)?;

    if output_mode.is_human() {
        print_node(&node, 0);
    } else {
        emit_success(output_mode, "show", node_json(&node))?;
    }
    Ok(())
}

pub fn run_version(output_mode: OutputMode) -> anyhow::Result<()> {
    if output_mode.is_human() {
        println!(
            "{} {} {}",
            Icons::BOOK,
            "Manuscript".bold().style(ui::theme().info.clone()),
            format!("Version {}", env!("CARGO_PKG_VERSION")).bold()
        );
    } else {
        emit_success(output_mode, "version", json!({ "version": env!("CARGO_PKG_VERSION") }))?;
    }
    Ok(())
}

// ========== Rendering ==========

fn node_json(node: &AnyNode) -> serde_json::Value {
    match node {
        AnyNode::Element(n) => element_json(n),
        AnyNode::Field(n) => field_json(n),
        AnyNode::Value(n) => value_json(n),
        AnyNode::ElementType(n) => element_type_json(n),
        AnyNode::FieldType(n) => field_type_json(n),
        AnyNode::ValueType(n) => value_type_json(n),
    }
}

fn element_json(element: &ElementRef) -> serde_json::Value {
    json!({
        "id": element.id(),
        "kind": element.kind(),
        "version": element.version(),
        "name": element.name(),
        "label": element.label(),
        "type": element.node_type().map(|t| t.name()),
        "fields": element.fields().iter().map(field_json).collect::<Vec<_>>(),
    })
}

fn field_json(field: &FieldRef) -> serde_json::Value {
    json!({
        "id": field.id(),
        "kind": field.kind(),
        "version": field.version(),
        "name": field.name(),
        "type": field.node_type().map(|t| t.name()),
        "minOccurs": field.min_occurs(),
        "maxOccurs": field.max_occurs(),
        "allowedTypes": kind_names(&field.allowed_types()),
        "satisfied": field.occurs_satisfied(),
        "values": field.values().iter().map(value_json).collect::<Vec<_>>(),
    })
}

fn value_json(value: &ValueRef) -> serde_json::Value {
    let variant = value.value();
    json!({
        "id": value.id(),
        "kind": value.kind(),
        "version": value.version(),
        "type": value.node_type().map(|t| t.name()),
        "valueKind": variant.kind().map(|k| k.as_str()),
        "value": variant.to_json(),
    })
}

fn element_type_json(t: &ElementTypeRef) -> serde_json::Value {
    json!({
        "id": t.id(),
        "kind": t.kind(),
        "name": t.name(),
        "fieldTypes": names(&t.field_types()),
    })
}

fn field_type_json(t: &FieldTypeRef) -> serde_json::Value {
    json!({
        "id": t.id(),
        "kind": t.kind(),
        "name": t.name(),
        "minOccurs": t.min_occurs(),
        "maxOccurs": t.max_occurs(),
        "allowedTypes": kind_names(&t.allowed_types()),
        "valueTypes": names(&t.value_types()),
    })
}

fn value_type_json(t: &ValueTypeRef) -> serde_json::Value {
    json!({
        "id": t.id(),
        "kind": t.kind(),
        "name": t.name(),
        "fieldTypes": names(&t.field_types()),
    })
}

fn heading(kind: manuscript::StorableKind, id: i64, name: &str) -> String {
    format!("{} {} {}", kind_label(kind), dim(&format!("#{}", id)), name)
}

fn print_node(node: &AnyNode, depth: usize) {
    match node {
        AnyNode::Element(element) => {
            let icon = if element.is_project() { Icons::BOOK } else { Icons::PAGE };
            let typed = element
                .node_type()
                .map(|t| muted(&format!(": {}", t.name())))
                .unwrap_or_default();
            let title = heading(element.kind(), element.id(), &element.name());
            tree_line(depth, icon, &format!("{}{}", title, typed));
            for field in element.fields() {
                print_node(&field.into(), depth + 1);
            }
        }
        AnyNode::Field(field) => {
            let mut text = heading(field.kind(), field.id(), &field.name());
            text.push_str(&format!(" {}", dim(&occurs(field.min_occurs(), field.max_occurs()))));
            if !field.occurs_satisfied() {
                text.push_str(&format!(" {}", Icons::WARN));
            }
            tree_line(depth, Icons::FIELD, &text);
            for value in field.values() {
                print_node(&value.into(), depth + 1);
            }
        }
        AnyNode::Value(value) => {
            let variant = value.value();
            let icon = if variant.nodes().is_empty() { Icons::VALUE } else { Icons::LINK };
            let kind = variant.kind().map(|k| k.as_str()).unwrap_or("null");
            let id = dim(&format!("#{}", value.id()));
            tree_line(depth, icon, &format!("{} {} {}", id, muted(kind), variant));
        }
        AnyNode::ElementType(t) => {
            tree_line(depth, Icons::SCHEMA, &heading(t.kind(), t.id(), &t.name()));
            for field_type in t.field_types() {
                print_node(&field_type.into(), depth + 1);
            }
        }
        AnyNode::FieldType(t) => {
            let row = field_type_row(t);
            let title = heading(t.kind(), t.id(), &t.name());
            tree_line(depth, Icons::SCHEMA, &format!("{} {}", title, dim(&row.constraints)));
            for value_type in t.value_types() {
                print_node(&value_type.into(), depth + 1);
            }
        }
        AnyNode::ValueType(t) => {
            tree_line(depth, Icons::SCHEMA, &heading(t.kind(), t.id(), &t.name()));
        }
    }
}
