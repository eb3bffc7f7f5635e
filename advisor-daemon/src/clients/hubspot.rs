//! HubSpot CRM client (notes and contacts).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use advisor_core::{
    ConnectorError, ContactInput, CrmChanges, CrmConnector, CrmContact, CrmNote, RefreshedToken,
    TokenRefresh,
};

use super::{check, invalid_response, network_error, TokenResponse};

/// HubSpot-defined association type for note -> contact.
const NOTE_TO_CONTACT: u32 = 202;

/// Largest page the CRM search API serves.
const SEARCH_PAGE_SIZE: usize = 100;

const NOTE_PROPERTIES: &[&str] = &["hs_note_body", "hs_timestamp", "hs_lastmodifieddate"];
const CONTACT_PROPERTIES: &[&str] = &[
    "firstname",
    "lastname",
    "email",
    "jobtitle",
    "company",
    "lifecyclestage",
    "city",
    "lastmodifieddate",
];

pub struct HubspotClient {
    http: Client,
    client_id: String,
    client_secret: String,
    base_url: String,
}

impl HubspotClient {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            http: Client::builder().build().unwrap_or_default(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            base_url: "https://api.hubapi.com".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Run a CRM search, following `paging.next.after` until `limit` records.
    /// With `oldest_first`, results are sorted ascending on that property.
    async fn search(
        &self,
        access_token: &str,
        object: &str,
        filter_groups: Value,
        oldest_first: Option<&str>,
        properties: &[&str],
        limit: usize,
    ) -> Result<Vec<CrmObject>, ConnectorError> {
        let url = format!("{}/crm/v3/objects/{}/search", self.base_url, object);
        let mut results = Vec::new();
        let mut after: Option<String> = None;

        while results.len() < limit {
            let mut body = json!({
                "filterGroups": filter_groups,
                "properties": properties,
                "limit": (limit - results.len()).min(SEARCH_PAGE_SIZE),
            });
            if let Some(property) = oldest_first {
                body["sorts"] = json!([{ "propertyName": property, "direction": "ASCENDING" }]);
            }
            if let Some(cursor) = &after {
                body["after"] = json!(cursor);
            }

            let response = self
                .http
                .post(&url)
                .bearer_auth(access_token)
                .json(&body)
                .send()
                .await
                .map_err(network_error)?;
            let page: SearchPage = check(response).await?.json().await.map_err(invalid_response)?;

            results.extend(page.results);
            match page.paging.and_then(|p| p.next).map(|n| n.after) {
                Some(cursor) => after = Some(cursor),
                None => break,
            }
        }

        results.truncate(limit);
        Ok(results)
    }

    async fn get_object(
        &self,
        access_token: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<CrmObject, ConnectorError> {
        let url = format!("{}/crm/v3/objects/{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(query)
            .send()
            .await
            .map_err(network_error)?;
        check(response).await?.json().await.map_err(invalid_response)
    }

    /// Email of the first contact associated with a note.
    async fn note_contact_email(
        &self,
        access_token: &str,
        note_id: &str,
    ) -> Result<Option<String>, ConnectorError> {
        let note = self
            .get_object(
                access_token,
                &format!("notes/{}", note_id),
                &[("associations", "contacts")],
            )
            .await?;

        let Some(contact_id) = note.first_contact_id() else {
            return Ok(None);
        };

        let contact = self
            .get_object(
                access_token,
                &format!("contacts/{}", contact_id),
                &[("properties", "email")],
            )
            .await?;
        Ok(contact.property("email").map(str::to_string))
    }
}

#[async_trait]
impl TokenRefresh for HubspotClient {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken, ConnectorError> {
        let response = self
            .http
            .post(format!("{}/oauth/v1/token", self.base_url))
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(network_error)?;
        let token: TokenResponse = check(response).await?.json().await.map_err(invalid_response)?;
        Ok(token.into())
    }
}

#[async_trait]
impl CrmConnector for HubspotClient {
    async fn search_modified_since(
        &self,
        access_token: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<CrmChanges, ConnectorError> {
        let since_millis = since.timestamp_millis().to_string();
        let modified_since = |property: &str| {
            json!([{
                "filters": [{
                    "propertyName": property,
                    "operator": "GTE",
                    "value": since_millis,
                }]
            }])
        };

        let note_objects = self
            .search(
                access_token,
                "notes",
                modified_since("hs_lastmodifieddate"),
                Some("hs_lastmodifieddate"),
                NOTE_PROPERTIES,
                limit,
            )
            .await?;

        let mut notes = Vec::with_capacity(note_objects.len());
        for object in note_objects {
            // A note whose contact cannot be resolved is still worth keeping.
            let contact_email = match self.note_contact_email(access_token, &object.id).await {
                Ok(email) => email,
                Err(e) if e.needs_reauth() || e.is_transient() => return Err(e),
                Err(e) => {
                    warn!(note_id = %object.id, error = %e, "Could not resolve note contact");
                    None
                }
            };
            notes.push(CrmNote {
                body: object.property("hs_note_body").unwrap_or_default().to_string(),
                modified_at: object.modified_at("hs_lastmodifieddate"),
                id: object.id,
                contact_email,
            });
        }

        let contacts: Vec<CrmContact> = self
            .search(
                access_token,
                "contacts",
                modified_since("lastmodifieddate"),
                Some("lastmodifieddate"),
                CONTACT_PROPERTIES,
                limit,
            )
            .await?
            .into_iter()
            .map(CrmObject::into_contact)
            .collect();

        debug!(
            notes = notes.len(),
            contacts = contacts.len(),
            since = %since,
            "Fetched HubSpot changes"
        );
        Ok(CrmChanges { notes, contacts })
    }

    async fn create_contact(
        &self,
        access_token: &str,
        contact: &ContactInput,
    ) -> Result<String, ConnectorError> {
        let mut properties = HashMap::new();
        properties.insert("email", contact.email.as_str());
        if let Some(first) = contact.first_name.as_deref() {
            properties.insert("firstname", first);
        }
        if let Some(last) = contact.last_name.as_deref() {
            properties.insert("lastname", last);
        }

        let response = self
            .http
            .post(format!("{}/crm/v3/objects/contacts", self.base_url))
            .bearer_auth(access_token)
            .json(&json!({ "properties": properties }))
            .send()
            .await
            .map_err(network_error)?;
        let created: CreatedObject = check(response).await?.json().await.map_err(invalid_response)?;
        Ok(created.id)
    }

    async fn find_contact(
        &self,
        access_token: &str,
        email: &str,
    ) -> Result<Option<String>, ConnectorError> {
        let filter = json!([{
            "filters": [{ "propertyName": "email", "operator": "EQ", "value": email }]
        }]);
        let found = self
            .search(access_token, "contacts", filter, None, &["email"], 1)
            .await?;
        Ok(found.into_iter().next().map(|c| c.id))
    }

    async fn add_note(
        &self,
        access_token: &str,
        contact_id: &str,
        content: &str,
    ) -> Result<String, ConnectorError> {
        let body = json!({
            "properties": {
                "hs_note_body": content,
                "hs_timestamp": Utc::now().timestamp_millis().to_string(),
            },
            "associations": [{
                "to": { "id": contact_id },
                "types": [{
                    "associationCategory": "HUBSPOT_DEFINED",
                    "associationTypeId": NOTE_TO_CONTACT,
                }]
            }]
        });

        let response = self
            .http
            .post(format!("{}/crm/v3/objects/notes", self.base_url))
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(network_error)?;
        let created: CreatedObject = check(response).await?.json().await.map_err(invalid_response)?;
        Ok(created.id)
    }
}

// Wire types

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    results: Vec<CrmObject>,
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    next: Option<NextPage>,
}

#[derive(Debug, Deserialize)]
struct NextPage {
    after: String,
}

#[derive(Debug, Deserialize)]
struct CreatedObject {
    id: String,
}

/// Any CRM object as the v3 API returns it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CrmObject {
    id: String,
    #[serde(default)]
    properties: HashMap<String, Option<String>>,
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    associations: HashMap<String, AssociationList>,
}

#[derive(Debug, Deserialize)]
struct AssociationList {
    #[serde(default)]
    results: Vec<AssociationRef>,
}

#[derive(Debug, Deserialize)]
struct AssociationRef {
    id: String,
}

impl CrmObject {
    fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .get(name)
            .and_then(|v| v.as_deref())
            .filter(|v| !v.is_empty())
    }

    fn first_contact_id(&self) -> Option<&str> {
        self.associations
            .get("contacts")
            .and_then(|list| list.results.first())
            .map(|r| r.id.as_str())
    }

    /// Modification time from the named property, falling back to `updatedAt`.
    fn modified_at(&self, property: &str) -> DateTime<Utc> {
        self.property(property)
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .or(self.updated_at)
            .unwrap_or_else(Utc::now)
    }

    fn into_contact(self) -> CrmContact {
        let owned = |name: &str| self.property(name).map(str::to_string);
        CrmContact {
            first_name: owned("firstname"),
            last_name: owned("lastname"),
            email: owned("email"),
            job_title: owned("jobtitle"),
            company: owned("company"),
            lifecycle_stage: owned("lifecyclestage"),
            city: owned("city"),
            modified_at: self.modified_at("lastmodifieddate"),
            id: self.id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{body_partial_json, body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> HubspotClient {
        HubspotClient::new("id", "secret").with_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_search_resolves_note_contacts() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/crm/v3/objects/notes/search"))
            .and(body_partial_json(json!({
                "sorts": [{ "propertyName": "hs_lastmodifieddate", "direction": "ASCENDING" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total": 1,
                "results": [{
                    "id": "n1",
                    "properties": {
                        "hs_note_body": "Prefers quarterly reviews",
                        "hs_lastmodifieddate": "2025-06-01T09:00:00.000Z"
                    },
                    "updatedAt": "2025-06-01T09:00:00.000Z"
                }]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/crm/v3/objects/notes/n1"))
            .and(query_param("associations", "contacts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "n1",
                "properties": {},
                "associations": {
                    "contacts": { "results": [{ "id": "c9", "type": "note_to_contact" }] }
                }
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/crm/v3/objects/contacts/c9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "c9",
                "properties": { "email": "pat@client.com" }
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/crm/v3/objects/contacts/search"))
            .and(body_partial_json(json!({
                "sorts": [{ "propertyName": "lastmodifieddate", "direction": "ASCENDING" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{
                    "id": "c9",
                    "properties": {
                        "firstname": "Pat",
                        "lastname": null,
                        "email": "pat@client.com",
                        "company": "",
                        "lastmodifieddate": "2025-06-01T08:00:00Z"
                    }
                }]
            })))
            .mount(&server)
            .await;

        let since = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();
        let changes = client(&server)
            .search_modified_since("tok", since, 50)
            .await
            .unwrap();

        assert_eq!(changes.notes.len(), 1);
        assert_eq!(changes.notes[0].body, "Prefers quarterly reviews");
        assert_eq!(changes.notes[0].contact_email.as_deref(), Some("pat@client.com"));
        assert_eq!(
            changes.notes[0].modified_at,
            Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
        );

        let contact = &changes.contacts[0];
        assert_eq!(contact.first_name.as_deref(), Some("Pat"));
        assert_eq!(contact.last_name, None);
        assert_eq!(contact.company, None);
    }

    #[tokio::test]
    async fn test_search_follows_paging() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/crm/v3/objects/contacts/search"))
            .and(body_partial_json(json!({ "after": "2" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{ "id": "c3", "properties": {} }]
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/crm/v3/objects/contacts/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    { "id": "c1", "properties": {} },
                    { "id": "c2", "properties": {} }
                ],
                "paging": { "next": { "after": "2" } }
            })))
            .mount(&server)
            .await;

        let found = client(&server)
            .search("tok", "contacts", json!([]), None, &["email"], 10)
            .await
            .unwrap();
        let ids: Vec<&str> = found.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);
    }

    #[tokio::test]
    async fn test_create_contact_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/crm/v3/objects/contacts"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "status": "error",
                "message": "Contact already exists. Existing ID: 512",
                "category": "CONFLICT"
            })))
            .mount(&server)
            .await;

        let input = ContactInput {
            email: "pat@client.com".into(),
            first_name: Some("Pat".into()),
            last_name: None,
        };
        let err = client(&server).create_contact("tok", &input).await.unwrap_err();
        assert!(matches!(err, ConnectorError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_find_contact_and_add_note() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/crm/v3/objects/contacts/search"))
            .and(body_string_contains("pat@client.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{ "id": "512", "properties": { "email": "pat@client.com" } }]
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/crm/v3/objects/notes"))
            .and(body_partial_json(json!({
                "properties": { "hs_note_body": "Called about rollover" },
                "associations": [{ "to": { "id": "512" } }]
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "n77" })))
            .mount(&server)
            .await;

        let hubspot = client(&server);
        let contact_id = hubspot
            .find_contact("tok", "pat@client.com")
            .await
            .unwrap()
            .unwrap();
        let note_id = hubspot
            .add_note("tok", &contact_id, "Called about rollover")
            .await
            .unwrap();
        assert_eq!(note_id, "n77");
    }

    #[tokio::test]
    async fn test_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/v1/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "fresh",
                "refresh_token": "r1",
                "expires_in": 1800
            })))
            .mount(&server)
            .await;

        let refreshed = client(&server).refresh("r1").await.unwrap();
        assert_eq!(refreshed.access_token, "fresh");
    }
}
