//! Artifact assembler
//!
//! Turns a project's generated source plus the scaffold into a self-contained
//! [`BuildContext`]. Assembly is pure: the same project and scaffold always
//! produce the same files, and therefore the same digest.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::deploy::scaffold::{render, Scaffold};
use crate::models::project::Project;
use crate::utils::{sha256_hash, truncate_message};

/// Entry point of the compiled app
pub const ENTRY_POINT: &str = "src/main.tsx";

const PLACEHOLDER_DESCRIPTION: &str = "Built with Shipyard";

/// Assembler options
#[derive(Debug, Clone, Default)]
pub struct AssembleOptions {
    /// Records API base URL exposed to deployed apps
    pub public_api_url: Option<String>,
}

/// Dependency manifest and runtime constants of a build
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub package_name: String,
    pub dependencies: BTreeMap<String, String>,
    pub dev_dependencies: BTreeMap<String, String>,
    pub entry_point: String,

    /// Constants injected into the page as `window.*` globals
    pub runtime_constants: BTreeMap<String, String>,
}

impl Manifest {
    /// `package.json` for this manifest
    pub fn package_json(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.package_name,
            "private": true,
            "version": "1.0.0",
            "type": "module",
            "scripts": {
                "dev": "vite",
                "build": "vite build",
                "preview": "vite preview"
            },
            "dependencies": self.dependencies,
            "devDependencies": self.dev_dependencies,
        })
    }
}

/// In-memory build context: relative path -> file content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    files: BTreeMap<String, String>,
    manifest: Manifest,
}

impl BuildContext {
    pub fn from_files(files: BTreeMap<String, String>, manifest: Manifest) -> Self {
        Self { files, manifest }
    }

    pub fn files(&self) -> &BTreeMap<String, String> {
        &self.files
    }

    pub fn file(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// SHA-256 over the canonical form of the context.
    ///
    /// Paths are visited in sorted order and every path and content is length
    /// prefixed, so no two distinct contexts share a byte stream.
    pub fn digest(&self) -> String {
        let mut buf = Vec::new();
        for (path, content) in &self.files {
            buf.extend_from_slice(&(path.len() as u64).to_le_bytes());
            buf.extend_from_slice(path.as_bytes());
            buf.extend_from_slice(&(content.len() as u64).to_le_bytes());
            buf.extend_from_slice(content.as_bytes());
        }
        // Only strings and string maps, serialization cannot fail
        buf.extend_from_slice(&serde_json::to_vec(&self.manifest).unwrap_or_default());
        sha256_hash(&buf)
    }
}

/// Reduce a component name to an identifier that stays inside
/// `src/components/`. Empty results are dropped.
pub fn component_name(raw: &str) -> Option<String> {
    let name: String = raw
        .trim()
        .trim_end_matches(".tsx")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();

    match name.chars().next() {
        None => None,
        Some(c) if c.is_ascii_digit() => Some(format!("C{}", name)),
        Some(_) => Some(name),
    }
}

/// Escape text for HTML content
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

/// A JS string literal that is also safe inside a `<script>` element
fn js_string(text: &str) -> String {
    serde_json::Value::String(text.to_string())
        .to_string()
        .replace("</", "<\\/")
}

fn runtime_globals(constants: &BTreeMap<String, String>) -> String {
    constants
        .iter()
        .map(|(key, value)| format!("window.{} = {};", key, value))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Root component that renders every component, in name order
fn generated_root(names: &[&String]) -> String {
    let binding = |name: &str| {
        if name == "App" {
            "AppComponent".to_string()
        } else {
            name.to_string()
        }
    };

    let mut out = String::from("import React from 'react';\n");
    for name in names {
        out.push_str(&format!(
            "import {} from './components/{}';\n",
            binding(name.as_str()),
            name
        ));
    }
    out.push_str("\nfunction App() {\n  return (\n    <>\n");
    for name in names {
        out.push_str(&format!("      <{} />\n", binding(name.as_str())));
    }
    out.push_str("    </>\n  );\n}\n\nexport default App;\n");
    out
}

/// Assemble the build context of a project
pub fn assemble(project: &Project, scaffold: &Scaffold, options: &AssembleOptions) -> BuildContext {
    let mut components: BTreeMap<String, String> = BTreeMap::new();
    for (raw, code) in &project.source.components {
        if let Some(name) = component_name(raw) {
            components.entry(name).or_insert_with(|| code.clone());
        }
    }

    let root = if project.source.root.is_none() && components.is_empty() {
        let description = if project.description.trim().is_empty() {
            PLACEHOLDER_DESCRIPTION.to_string()
        } else {
            truncate_message(&project.description, 100)
        };
        let name = format!("{{{}}}", js_string(&project.name));
        let description = format!("{{{}}}", js_string(&description));
        let welcome = render(
            &scaffold.placeholder_welcome,
            &[("name", name.as_str()), ("description", description.as_str())],
        );
        components.insert("Welcome".to_string(), welcome);
        scaffold.placeholder_app.clone()
    } else {
        match &project.source.root {
            Some(root) => root.clone(),
            None => generated_root(&components.keys().collect::<Vec<_>>()),
        }
    };

    let mut runtime_constants = BTreeMap::new();
    runtime_constants.insert("SHIPYARD_APP_ID".to_string(), project.id.to_string());
    if let Some(url) = &options.public_api_url {
        runtime_constants.insert("SHIPYARD_API_BASE".to_string(), js_string(url));
    }

    let manifest = Manifest {
        package_name: format!("app-{}", project.id),
        dependencies: scaffold.dependencies.clone(),
        dev_dependencies: scaffold.dev_dependencies.clone(),
        entry_point: ENTRY_POINT.to_string(),
        runtime_constants,
    };

    let title = escape_html(&project.name);
    let globals = runtime_globals(&manifest.runtime_constants);
    let index_html = render(
        &scaffold.index_html,
        &[
            ("title", title.as_str()),
            ("runtime_globals", globals.as_str()),
            ("entry", ENTRY_POINT),
        ],
    );

    let mut files = BTreeMap::new();
    files.insert("Dockerfile".to_string(), scaffold.render_dockerfile());
    files.insert(
        "package.json".to_string(),
        format!("{:#}\n", manifest.package_json()),
    );
    files.insert("vite.config.ts".to_string(), scaffold.vite_config.clone());
    files.insert("index.html".to_string(), index_html);
    files.insert(ENTRY_POINT.to_string(), scaffold.main_tsx.clone());
    files.insert("src/App.tsx".to_string(), root);
    for (name, code) in components {
        files.insert(format!("src/components/{}.tsx", name), code);
    }

    BuildContext::from_files(files, manifest)
}
