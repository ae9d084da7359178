use super::{Adapter, Context, json_encoding};
use crate::{
    api::Elasticsearch,
    generator::{
        GeneratorError,
        auth::{bearer_header, http_auth},
        elements::{Element, Sink, Transform, strings, table},
        template::{field_reference, template_remap},
        tls::output_tls,
    },
};

const DEFAULT_INDEX: &str = r#"{.log_type||"none"}-write"#;

/// Version 6 clusters need an explicit document id for `create` actions.
const ADD_ID: &str = r#"._id = encode_base64(uuid_v4())
if exists(.kubernetes.event.metadata.uid) {
  ._id = .kubernetes.event.metadata.uid
}"#;

impl Adapter for Elasticsearch {
    fn adapt(&self, cx: &Context<'_>) -> Result<Vec<Element>, GeneratorError> {
        let mut elements = Vec::new();
        let mut upstream = cx.inputs.clone();
        if self.version == 6 {
            let add_id = Transform::remap(cx.element_id("add_id"), upstream, ADD_ID);
            upstream = vec![add_id.id.clone()];
            elements.push(add_id.into());
        }
        let index = template_remap(
            cx.element_id("index"),
            upstream,
            self.index.as_deref().unwrap_or(DEFAULT_INDEX),
            "es_index",
        );

        let mut sink = Sink::new(cx.id.as_str(), self.sink_type(), vec![index.id.clone()])
            .with("endpoints", strings(&[self.url.as_str()]))
            .with(
                "bulk",
                table([
                    ("action", "create".into()),
                    ("index", field_reference("es_index").into()),
                ]),
            )
            .with("api_version", if self.version == 6 { "v6" } else { "auto" })
            .encoding(json_encoding())
            .tunable();
        if self.version == 6 {
            sink.set("id_key", "_id");
        }
        if let Some(auth) = &self.authentication {
            match bearer_header(auth, cx.options) {
                Some(header) => {
                    sink.request_mut().headers.insert("Authorization".into(), header);
                }
                None => sink.auth = http_auth(auth, cx.options),
            }
        }
        sink.tls = output_tls(cx.output, Some(&self.url), cx.options, false);

        elements.push(index.into());
        elements.push(cx.finish(sink));
        Ok(elements)
    }

    fn sink_type(&self) -> &'static str {
        "elasticsearch"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::{BearerToken, HttpAuthentication, OutputSpec, OutputType, SecretKey},
        generator::outputs::tests::{adapt, render},
        secrets::Secrets,
    };

    fn output(version: u32, authentication: Option<HttpAuthentication>) -> OutputSpec {
        let mut output = OutputSpec::new("es", OutputType::Elasticsearch);
        output.elasticsearch = Some(Elasticsearch {
            url: "https://es.example.com:9200".into(),
            version,
            index: Some(r#"app-{.kubernetes.namespace_name||"none"}"#.into()),
            authentication,
            tuning: None,
        });
        output
    }

    #[test]
    fn version_six_adds_document_ids() {
        let elements = adapt(&output(6, None), &Secrets::new());
        let ids: Vec<&str> = elements.iter().map(Element::id).collect();
        assert_eq!(ids, ["output_es_add_id", "output_es_index", "output_es"]);

        let index = render(&elements, "output_es_index");
        assert_eq!(index["inputs"][0].as_str(), Some("output_es_add_id"));

        let sink = render(&elements, "output_es");
        assert_eq!(sink["id_key"].as_str(), Some("_id"));
        assert_eq!(sink["api_version"].as_str(), Some("v6"));
        assert_eq!(sink["bulk"]["action"].as_str(), Some("create"));
        assert_eq!(sink["bulk"]["index"].as_str(), Some("{{ _internal.es_index }}"));
    }

    #[test]
    fn current_version_with_bearer_token() {
        let auth = HttpAuthentication {
            token: Some(BearerToken::Secret {
                secret: SecretKey::new("es-token", "token"),
            }),
            ..Default::default()
        };
        let elements = adapt(&output(8, Some(auth)), &Secrets::new());
        assert_eq!(elements.len(), 2);

        let sink = render(&elements, "output_es");
        assert_eq!(sink["endpoints"][0].as_str(), Some("https://es.example.com:9200"));
        assert!(!sink.contains_key("id_key"));
        assert!(!sink.contains_key("auth"));
        assert_eq!(
            sink["request"]["headers"]["Authorization"].as_str(),
            Some("Bearer SECRET[kubernetes_secret.es-token/token]")
        );
    }
}
