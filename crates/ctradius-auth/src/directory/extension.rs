use super::{DirectoryClient, DirectoryError};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

/// Data category of a ChurchTools custom module
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataCategory {
    pub id: u64,
    pub name: String,
    pub custom_module_id: u64,
}

/// One stored value of a data category; `value` is JSON-encoded text
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataValue {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Deserialize)]
struct CustomModule {
    id: u64,
}

/// Read access to the data categories of one custom module (extension)
///
/// The module id and category list are fetched once and reused.
pub struct ExtensionData {
    client: Arc<dyn DirectoryClient>,
    extension_key: String,
    module_id: OnceCell<u64>,
    categories: OnceCell<Vec<DataCategory>>,
}

impl ExtensionData {
    pub fn new(client: Arc<dyn DirectoryClient>, extension_key: impl Into<String>) -> Self {
        ExtensionData {
            client,
            extension_key: extension_key.into(),
            module_id: OnceCell::new(),
            categories: OnceCell::new(),
        }
    }

    pub fn extension_key(&self) -> &str {
        &self.extension_key
    }

    async fn module_id(&self) -> Result<u64, DirectoryError> {
        self.module_id
            .get_or_try_init(|| async {
                let path = format!("/custommodules/{}", self.extension_key);
                let module: CustomModule = parse(&path, self.client.get(&path).await?)?;
                debug!(extension = %self.extension_key, module_id = module.id, "Resolved custom module");
                Ok::<_, DirectoryError>(module.id)
            })
            .await
            .copied()
    }

    pub async fn categories(&self) -> Result<&[DataCategory], DirectoryError> {
        let categories = self
            .categories
            .get_or_try_init(|| async {
                let module_id = self.module_id().await?;
                let path = format!("/custommodules/{}/customdatacategories", module_id);
                match self.client.get(&path).await? {
                    Value::Null => Ok(Vec::new()),
                    body => parse::<Vec<DataCategory>>(&path, body),
                }
            })
            .await?;
        Ok(categories.as_slice())
    }

    pub async fn has_category(&self, name: &str) -> Result<bool, DirectoryError> {
        Ok(self.categories().await?.iter().any(|c| c.name == name))
    }

    pub async fn category(&self, name: &str) -> Result<DataCategory, DirectoryError> {
        self.categories()
            .await?
            .iter()
            .find(|c| c.name == name)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(format!("category '{}'", name)))
    }

    /// All values stored in a category
    pub async fn values(&self, name: &str) -> Result<Vec<DataValue>, DirectoryError> {
        let category = self.category(name).await?;
        let path = format!(
            "/custommodules/{}/customdatacategories/{}/customdatavalues",
            category.custom_module_id, category.id
        );
        match self.client.get(&path).await? {
            Value::Null => Ok(Vec::new()),
            body => parse(&path, body),
        }
    }

    /// The only value stored in a category; any other count is an error
    pub async fn single_value(&self, name: &str) -> Result<DataValue, DirectoryError> {
        let mut values = self.values(name).await?;
        if values.len() != 1 {
            return Err(DirectoryError::invalid_response(
                name,
                format!("expected exactly one entry, found {}", values.len()),
            ));
        }
        Ok(values.remove(0))
    }
}

fn parse<T: serde::de::DeserializeOwned>(path: &str, body: Value) -> Result<T, DirectoryError> {
    serde_json::from_value(body).map_err(|e| DirectoryError::invalid_response(path, e.to_string()))
}
