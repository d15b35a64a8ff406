//! Build scaffold templates
//!
//! Fixed files every generated app is built with. Templates use `{{name}}`
//! placeholders filled in by [`render`].

use std::collections::BTreeMap;

/// Dockerfile of the shared base serving image
pub const BASE_DOCKERFILE: &str = r#"FROM node:20-alpine
WORKDIR /app
RUN npm install -g serve
EXPOSE 80
CMD ["serve", "-s", "dist", "-l", "80"]
"#;

const APP_DOCKERFILE: &str = r#"FROM node:20-alpine AS builder
WORKDIR /app

COPY package.json ./
RUN npm install --legacy-peer-deps

COPY . .
RUN npm run build

FROM {{base_image}}
WORKDIR /app
COPY --from=builder /app/dist ./dist
"#;

const VITE_CONFIG: &str = r#"import { defineConfig } from 'vite'
import react from '@vitejs/plugin-react'

export default defineConfig({
  plugins: [react()],
})
"#;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>{{title}}</title>
    <style>* { margin: 0; padding: 0; box-sizing: border-box; }</style>
    <script>{{runtime_globals}}</script>
  </head>
  <body>
    <div id="root"></div>
    <script type="module" src="/{{entry}}"></script>
  </body>
</html>
"#;

const MAIN_TSX: &str = r#"import React from 'react'
import ReactDOM from 'react-dom/client'
import App from './App'

ReactDOM.createRoot(document.getElementById('root')!).render(
  <React.StrictMode>
    <App />
  </React.StrictMode>,
)
"#;

const PLACEHOLDER_APP: &str = r#"import React from 'react';
import Welcome from './components/Welcome';

function App() {
  return <Welcome />;
}

export default App;
"#;

const PLACEHOLDER_WELCOME: &str = r#"import React from 'react';

function Welcome() {
  return (
    <div style={{
      minHeight: '100vh',
      display: 'flex',
      alignItems: 'center',
      justifyContent: 'center',
      background: 'linear-gradient(135deg, #667eea 0%, #764ba2 100%)',
      color: 'white',
      fontFamily: 'system-ui',
      textAlign: 'center',
      padding: '20px'
    }}>
      <div>
        <h1 style={{ fontSize: '48px', marginBottom: '20px' }}>
          {{name}}
        </h1>
        <p style={{ fontSize: '20px', opacity: 0.9 }}>
          {{description}}
        </p>
      </div>
    </div>
  );
}

export default Welcome;
"#;

/// Replace every `{{key}}` in `template` with its value. Values are inserted
/// verbatim; callers escape for the target language.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{{{}}}}}", key), value);
    }
    out
}

/// Templates and dependency set used to assemble a build context
#[derive(Debug, Clone)]
pub struct Scaffold {
    pub base_image: String,
    pub dockerfile: String,
    pub vite_config: String,
    pub index_html: String,
    pub main_tsx: String,
    pub placeholder_app: String,
    pub placeholder_welcome: String,
    pub dependencies: BTreeMap<String, String>,
    pub dev_dependencies: BTreeMap<String, String>,
}

impl Scaffold {
    /// The default React + Vite scaffold on top of `base_image`
    pub fn new(base_image: &str) -> Self {
        let deps = |pairs: &[(&str, &str)]| {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>()
        };

        Self {
            base_image: base_image.to_string(),
            dockerfile: APP_DOCKERFILE.to_string(),
            vite_config: VITE_CONFIG.to_string(),
            index_html: INDEX_HTML.to_string(),
            main_tsx: MAIN_TSX.to_string(),
            placeholder_app: PLACEHOLDER_APP.to_string(),
            placeholder_welcome: PLACEHOLDER_WELCOME.to_string(),
            dependencies: deps(&[("react", "^18.2.0"), ("react-dom", "^18.2.0")]),
            dev_dependencies: deps(&[
                ("@types/react", "^18.2.0"),
                ("@types/react-dom", "^18.2.0"),
                ("@vitejs/plugin-react", "^4.2.0"),
                ("vite", "^5.0.0"),
            ]),
        }
    }

    /// Dockerfile of the shared base image
    pub fn base_dockerfile(&self) -> &'static str {
        BASE_DOCKERFILE
    }

    /// App Dockerfile with the base image filled in
    pub fn render_dockerfile(&self) -> String {
        render(&self.dockerfile, &[("base_image", self.base_image.as_str())])
    }
}

impl Default for Scaffold {
    fn default() -> Self {
        Self::new("shipyard-base:node20")
    }
}
