// streamctl - CLI for the Stream activity log
// Copyright (C) 2024 Mathias Uhl <mathiasuhl@gmx.de>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Alert rules, edited through the same `admin-ajax.php` actions the alerts
//! admin screen calls.
//!
//! Every call is a single blocking request bounded by the client timeout.
//! Nothing is retried.

use crate::client::ApiClient;
use anyhow::Result;
use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;

pub const ACTION_NEW_ALERT_FORM: &str = "get_new_alert_triggers_notifications";
pub const ACTION_ALERT_SETTINGS: &str = "load_alerts_settings";
pub const ACTION_GET_ACTIONS: &str = "get_actions";
pub const ACTION_SAVE_ALERT: &str = "save_new_alert";

const FIELD_PREFIX: &str = "wp_stream_";
const NONCE_FIELD: &str = "wp_stream_alerts_nonce";

/// Settings each alert type adds to the form, by element id suffix.
const TYPE_FIELDS: &[(&str, &[&str])] = &[
    ("email", &["email_recipient", "email_subject"]),
    ("highlight", &["highlight_color"]),
    ("ifttt", &["ifttt_maker_key", "ifttt_event_name"]),
];

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("{action} was rejected by the site: {message}")]
    Rejected { action: String, message: String },
    #[error("{action} is not registered on the site (admin-ajax.php returned 0)")]
    UnknownAction { action: String },
    #[error("{action} failed the nonce check (admin-ajax.php returned -1)")]
    NonceRejected { action: String },
    #[error("{action} returned a response without `{field}`")]
    MissingField { action: String, field: &'static str },
    #[error("{action} returned a non-JSON response (HTTP {status}): {excerpt}")]
    InvalidResponse {
        action: String,
        status: u16,
        excerpt: String,
    },
}

/// The trigger half of an alert: who did what to which context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trigger {
    pub author: Option<String>,
    pub context: Option<String>,
    pub action: Option<String>,
}

impl Trigger {
    fn form_fields(&self) -> Vec<(String, String)> {
        [
            ("trigger_author", &self.author),
            ("trigger_context", &self.context),
            ("trigger_action", &self.action),
        ]
        .into_iter()
        .filter_map(|(name, value)| {
            value
                .as_ref()
                .map(|v| (format!("{FIELD_PREFIX}{name}"), v.clone()))
        })
        .collect()
    }
}

/// The values of an alert's add/edit form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertForm {
    pub trigger: Trigger,
    pub alert_type: String,
    pub status: Option<String>,
    /// Type-specific settings keyed by element id.
    pub settings: IndexMap<String, String>,
}

impl AlertForm {
    /// Rebuilds the form from a row's hidden data attributes.
    ///
    /// Keys may carry the `wp_stream_` prefix or not. Settings belonging to
    /// another alert type than the row's are left out.
    pub fn from_row_data(row: &IndexMap<String, String>) -> Self {
        let lookup = |name: &str| {
            row.get(&format!("{FIELD_PREFIX}{name}"))
                .or_else(|| row.get(name))
                .filter(|v| !v.is_empty())
                .cloned()
        };

        let alert_type = lookup("alert_type").unwrap_or_else(|| "none".to_string());
        let mut settings = IndexMap::new();
        for &name in type_fields(&alert_type) {
            if let Some(value) = lookup(name) {
                settings.insert(format!("{FIELD_PREFIX}{name}"), value);
            }
        }

        AlertForm {
            trigger: Trigger {
                author: lookup("trigger_author"),
                context: lookup("trigger_context"),
                action: lookup("trigger_action"),
            },
            alert_type,
            status: lookup("alert_status"),
            settings,
        }
    }

    /// Sets a setting, accepting either the element id or its unprefixed name.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let id = if name.starts_with(FIELD_PREFIX) {
            name.to_string()
        } else {
            format!("{FIELD_PREFIX}{name}")
        };
        self.settings.insert(id, value.into());
    }

    /// Every field keyed by element id, as sent with `save_new_alert`.
    pub fn form_fields(&self) -> Vec<(String, String)> {
        let mut fields = self.trigger.form_fields();
        fields.push((format!("{FIELD_PREFIX}alert_type"), self.alert_type.clone()));
        if let Some(status) = &self.status {
            fields.push((format!("{FIELD_PREFIX}alert_status"), status.clone()));
        }
        fields.extend(self.settings.iter().map(|(k, v)| (k.clone(), v.clone())));
        fields
    }
}

fn type_fields(alert_type: &str) -> &'static [&'static str] {
    TYPE_FIELDS
        .iter()
        .find(|(name, _)| *name == alert_type)
        .map(|(_, fields)| *fields)
        .unwrap_or(&[])
}

pub struct AlertsClient<'a> {
    client: &'a ApiClient,
    path: String,
    nonce: Option<String>,
}

impl<'a> AlertsClient<'a> {
    pub fn new(client: &'a ApiClient, path: impl Into<String>, nonce: Option<String>) -> Self {
        Self {
            client,
            path: path.into(),
            nonce,
        }
    }

    /// Markup of the trigger and notification fields for a new alert.
    pub fn new_alert_form(&self) -> Result<String> {
        let payload = self.call(ACTION_NEW_ALERT_FORM, Vec::new())?;
        html(ACTION_NEW_ALERT_FORM, payload)
    }

    /// Markup of the settings specific to `alert_type`.
    pub fn alert_settings(&self, alert_type: &str, trigger: &Trigger) -> Result<String> {
        let mut params = vec![("alert_type".to_string(), alert_type.to_string())];
        params.extend(trigger.form_fields());
        let payload = self.call(ACTION_ALERT_SETTINGS, params)?;
        html(ACTION_ALERT_SETTINGS, payload)
    }

    /// Action id → label for the actions a connector logs.
    pub fn connector_actions(&self, connector: &str) -> Result<IndexMap<String, String>> {
        let payload = self.call(
            ACTION_GET_ACTIONS,
            vec![("connector".to_string(), connector.to_string())],
        )?;
        Ok(action_options(ACTION_GET_ACTIONS, payload))
    }

    pub fn save_alert(&self, form: &AlertForm) -> Result<()> {
        let mut params = Vec::new();
        if let Some(nonce) = &self.nonce {
            params.push((NONCE_FIELD.to_string(), nonce.clone()));
        }
        params.extend(form.form_fields());
        let json = self.post(ACTION_SAVE_ALERT, params)?;
        Ok(save_outcome(ACTION_SAVE_ALERT, json)?)
    }

    fn call(&self, action: &str, params: Vec<(String, String)>) -> Result<Value> {
        let json = self.post(action, params)?;
        Ok(unwrap_envelope(action, json)?)
    }

    fn post(&self, action: &str, params: Vec<(String, String)>) -> Result<Value> {
        let mut form = vec![("action".to_string(), action.to_string())];
        form.extend(params);
        tracing::debug!(action, fields = form.len(), "calling admin-ajax");

        let response = self.client.post_form(&self.path, &form)?;
        let Some(json) = response.json else {
            return Err(AlertError::InvalidResponse {
                action: action.to_string(),
                status: response.status,
                excerpt: response.body.chars().take(120).collect(),
            }
            .into());
        };
        Ok(json)
    }
}

/// A save only counts when the site answers with a true `success` flag,
/// wrapped in the usual envelope or bare.
fn save_outcome(action: &str, json: Value) -> Result<(), AlertError> {
    match json.get("success").cloned() {
        Some(Value::Bool(_)) => unwrap_envelope(action, json).map(|_| ()),
        Some(other) => Err(AlertError::Rejected {
            action: action.to_string(),
            message: format!("unexpected `success` value {other}"),
        }),
        None => match json {
            Value::Bool(true) => Ok(()),
            Value::Bool(false) => Err(AlertError::Rejected {
                action: action.to_string(),
                message: rejection_message(&Value::Null),
            }),
            other => unwrap_envelope(action, other).and_then(|_| {
                Err(AlertError::MissingField {
                    action: action.to_string(),
                    field: "success",
                })
            }),
        },
    }
}

/// Strips WordPress's `{"success": .., "data": ..}` wrapper when present.
fn unwrap_envelope(action: &str, json: Value) -> Result<Value, AlertError> {
    match json {
        Value::Number(n) if n.as_i64() == Some(0) => Err(AlertError::UnknownAction {
            action: action.to_string(),
        }),
        Value::Number(n) if n.as_i64() == Some(-1) => Err(AlertError::NonceRejected {
            action: action.to_string(),
        }),
        Value::Object(mut map) if map.get("success").is_some_and(Value::is_boolean) => {
            let success = map.get("success").and_then(Value::as_bool).unwrap_or(false);
            let data = map.remove("data").unwrap_or(Value::Null);
            if success {
                Ok(data)
            } else {
                Err(AlertError::Rejected {
                    action: action.to_string(),
                    message: rejection_message(&data),
                })
            }
        }
        other => Ok(other),
    }
}

fn rejection_message(data: &Value) -> String {
    match data {
        Value::Null => "no reason given".to_string(),
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| data.to_string()),
        other => other.to_string(),
    }
}

fn html(action: &str, payload: Value) -> Result<String> {
    payload
        .get("html")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            AlertError::MissingField {
                action: action.to_string(),
                field: "html",
            }
            .into()
        })
}

/// Accepts either `{"id": "label"}` or select2's `[{"id": .., "text": ..}]`.
fn action_options(action: &str, payload: Value) -> IndexMap<String, String> {
    let label = |v: &Value| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    match payload {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), label(v))).collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                let id = item.get("id").map(label)?;
                let text = item.get("text").map(label).unwrap_or_else(|| id.clone());
                Some((id, text))
            })
            .collect(),
        other => {
            tracing::warn!(action, ?other, "unexpected action list, treating it as empty");
            IndexMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    const AJAX: &str = "/wp-admin/admin-ajax.php";

    fn client(server: &MockServer) -> ApiClient {
        ApiClient::new(&server.base_url(), None, Duration::from_secs(5)).unwrap()
    }

    fn row(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn prefills_email_alert_from_row() {
        let form = AlertForm::from_row_data(&row(&[
            ("wp_stream_trigger_author", "1"),
            ("trigger_context", "posts-post"),
            ("wp_stream_trigger_action", "updated"),
            ("wp_stream_alert_type", "email"),
            ("wp_stream_alert_status", "wp_stream_enabled"),
            ("wp_stream_email_recipient", "ops@example.org"),
            ("wp_stream_email_subject", "Post updated"),
            ("wp_stream_highlight_color", "red"),
        ]));

        assert_eq!(form.trigger.author.as_deref(), Some("1"));
        assert_eq!(form.trigger.context.as_deref(), Some("posts-post"));
        assert_eq!(form.trigger.action.as_deref(), Some("updated"));
        assert_eq!(form.alert_type, "email");
        assert_eq!(form.status.as_deref(), Some("wp_stream_enabled"));
        assert_eq!(
            form.settings,
            row(&[
                ("wp_stream_email_recipient", "ops@example.org"),
                ("wp_stream_email_subject", "Post updated"),
            ])
        );
    }

    #[test]
    fn prefills_highlight_and_ifttt_settings() {
        let highlight = AlertForm::from_row_data(&row(&[
            ("alert_type", "highlight"),
            ("highlight_color", "yellow"),
            ("ifttt_event_name", "ignored"),
        ]));
        assert_eq!(
            highlight.settings,
            row(&[("wp_stream_highlight_color", "yellow")])
        );

        let ifttt = AlertForm::from_row_data(&row(&[
            ("alert_type", "ifttt"),
            ("ifttt_maker_key", "abc123"),
            ("ifttt_event_name", "stream_alert"),
        ]));
        assert_eq!(
            ifttt.settings,
            row(&[
                ("wp_stream_ifttt_maker_key", "abc123"),
                ("wp_stream_ifttt_event_name", "stream_alert"),
            ])
        );
    }

    #[test]
    fn empty_row_defaults_to_no_notification() {
        let form = AlertForm::from_row_data(&IndexMap::new());
        assert_eq!(form.alert_type, "none");
        assert_eq!(form.trigger, Trigger::default());
        assert!(form.settings.is_empty());
        assert_eq!(
            form.form_fields(),
            vec![("wp_stream_alert_type".to_string(), "none".to_string())]
        );
    }

    #[test]
    fn loads_new_alert_form() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path(AJAX)
                .x_www_form_urlencoded_tuple("action", ACTION_NEW_ALERT_FORM);
            then.status(200)
                .json_body(json!({"success": true, "data": {"html": "<div>form</div>"}}));
        });

        let api = client(&server);
        let html = AlertsClient::new(&api, AJAX, None).new_alert_form().unwrap();
        mock.assert();
        assert_eq!(html, "<div>form</div>");
    }

    #[test]
    fn loads_settings_with_trigger_fields() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path(AJAX)
                .x_www_form_urlencoded_tuple("action", ACTION_ALERT_SETTINGS)
                .x_www_form_urlencoded_tuple("alert_type", "email")
                .x_www_form_urlencoded_tuple("wp_stream_trigger_context", "posts");
            then.status(200).json_body(json!({"html": "<input id=\"email\">"}));
        });

        let api = client(&server);
        let trigger = Trigger {
            context: Some("posts".into()),
            ..Default::default()
        };
        let html = AlertsClient::new(&api, AJAX, None)
            .alert_settings("email", &trigger)
            .unwrap();
        mock.assert();
        assert_eq!(html, "<input id=\"email\">");
    }

    #[test]
    fn lists_connector_actions_in_either_shape() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path(AJAX)
                .x_www_form_urlencoded_tuple("connector", "posts");
            then.status(200).json_body(
                json!({"success": true, "data": {"updated": "Updated", "trashed": "Trashed"}}),
            );
        });
        server.mock(|when, then| {
            when.method(POST)
                .path(AJAX)
                .x_www_form_urlencoded_tuple("connector", "users");
            then.status(200)
                .json_body(json!([{"id": "login", "text": "Log In"}, {"id": "logout"}]));
        });

        let api = client(&server);
        let alerts = AlertsClient::new(&api, AJAX, None);
        let posts = alerts.connector_actions("posts").unwrap();
        assert_eq!(
            posts.into_iter().collect::<Vec<_>>(),
            vec![
                ("updated".to_string(), "Updated".to_string()),
                ("trashed".to_string(), "Trashed".to_string()),
            ]
        );
        let users = alerts.connector_actions("users").unwrap();
        assert_eq!(users["login"], "Log In");
        assert_eq!(users["logout"], "logout");
    }

    #[test]
    fn saves_alert_with_nonce_and_form_fields() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path(AJAX)
                .x_www_form_urlencoded_tuple("action", ACTION_SAVE_ALERT)
                .x_www_form_urlencoded_tuple(NONCE_FIELD, "n0nce")
                .x_www_form_urlencoded_tuple("wp_stream_trigger_author", "1")
                .x_www_form_urlencoded_tuple("wp_stream_alert_type", "highlight")
                .x_www_form_urlencoded_tuple("wp_stream_highlight_color", "red");
            then.status(200).json_body(json!({"success": true}));
        });

        let api = client(&server);
        let mut form = AlertForm {
            trigger: Trigger {
                author: Some("1".into()),
                ..Default::default()
            },
            alert_type: "highlight".into(),
            ..Default::default()
        };
        form.set("highlight_color", "red");
        AlertsClient::new(&api, AJAX, Some("n0nce".into()))
            .save_alert(&form)
            .unwrap();
        mock.assert();
    }

    #[test]
    fn unsuccessful_save_is_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path(AJAX);
            then.status(200)
                .json_body(json!({"success": false, "data": {"message": "Missing trigger"}}));
        });

        let api = client(&server);
        let err = AlertsClient::new(&api, AJAX, None)
            .save_alert(&AlertForm::default())
            .unwrap_err();
        assert!(err.to_string().contains("Missing trigger"));
    }

    #[test]
    fn save_without_a_true_success_flag_is_an_error() {
        for body in [json!(false), json!({}), json!({"success": "0"}), json!({"data": 1})] {
            let server = MockServer::start();
            server.mock(|when, then| {
                when.method(POST).path(AJAX);
                then.status(200).json_body(body.clone());
            });

            let api = client(&server);
            let err = AlertsClient::new(&api, AJAX, None)
                .save_alert(&AlertForm::default())
                .unwrap_err();
            let err = err.downcast_ref::<AlertError>().unwrap();
            assert!(
                matches!(
                    err,
                    AlertError::Rejected { .. } | AlertError::MissingField { field: "success", .. }
                ),
                "{body}: {err}"
            );
        }
    }

    #[test]
    fn bare_true_counts_as_saved() {
        assert!(save_outcome(ACTION_SAVE_ALERT, json!(true)).is_ok());
        assert!(save_outcome(ACTION_SAVE_ALERT, json!({"success": true, "data": null})).is_ok());
        assert!(matches!(
            save_outcome(ACTION_SAVE_ALERT, json!(-1)),
            Err(AlertError::NonceRejected { .. })
        ));
    }

    #[test]
    fn non_json_reply_names_status_and_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path(AJAX);
            then.status(200).body("<html>Fatal error</html>");
        });

        let api = client(&server);
        let err = AlertsClient::new(&api, AJAX, None)
            .new_alert_form()
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("HTTP 200"), "{message}");
        assert!(message.contains("Fatal error"), "{message}");
    }

    #[test]
    fn unexpected_action_list_is_empty() {
        assert!(action_options(ACTION_GET_ACTIONS, json!(false)).is_empty());
        assert!(action_options(ACTION_GET_ACTIONS, Value::Null).is_empty());
    }

    #[test]
    fn admin_ajax_status_codes_are_errors() {
        assert!(matches!(
            unwrap_envelope("x", json!(0)),
            Err(AlertError::UnknownAction { .. })
        ));
        assert!(matches!(
            unwrap_envelope("x", json!(-1)),
            Err(AlertError::NonceRejected { .. })
        ));
        assert_eq!(
            unwrap_envelope("x", json!({"html": "a"})).unwrap(),
            json!({"html": "a"})
        );
    }

    #[test]
    fn missing_html_is_reported() {
        let err = html(ACTION_NEW_ALERT_FORM, json!({})).unwrap_err();
        assert!(err.to_string().contains("without `html`"));
    }
}
