//! AWS DynamoDB key-value store.
//!
//! Each [`TableSchema`] maps to one DynamoDB table whose key attributes
//! are string-typed (`S`).  The opaque value lives in a single `value`
//! attribute.  Reads are always issued with `ConsistentRead = true`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use aws_sdk_dynamodb::error::{DisplayErrorContext, SdkError};
use aws_sdk_dynamodb::operation::create_table::CreateTableError;
use aws_sdk_dynamodb::operation::delete_item::DeleteItemError;
use aws_sdk_dynamodb::operation::describe_table::DescribeTableError;
use aws_sdk_dynamodb::operation::get_item::GetItemError;
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::operation::query::QueryError;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, KeySchemaElement, KeyType,
    ScalarAttributeType, TableStatus,
};
use aws_sdk_dynamodb::Client;
use tracing::{debug, info};

use super::store::{
    ItemKey, KeyValueStore, PutCondition, RangeItem, RangePage, RangeQuery, StoreError,
    StoreErrorKind, StoreResult, TableSchema,
};
use crate::config::DynamoDbConfig;

/// Attribute holding the serialized descriptor.
const VALUE_ATTRIBUTE: &str = "value";

/// Delay between `DescribeTable` polls while a new table is being created.
const TABLE_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct DynamoDbStore {
    client: Client,
    table_ready_timeout: Duration,
}

impl DynamoDbStore {
    pub async fn new(config: &DynamoDbConfig) -> Self {
        let mut builder = aws_config::defaults(aws_config::BehaviorVersion::latest());

        if let Some(region) = &config.region {
            builder = builder.region(aws_config::Region::new(region.clone()));
        }

        if let Some(endpoint_url) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint_url);
        }

        let cfg = builder.load().await;
        Self::from_client(
            Client::new(&cfg),
            Duration::from_secs(config.table_ready_timeout_secs),
        )
    }

    pub fn from_client(client: Client, table_ready_timeout: Duration) -> Self {
        Self {
            client,
            table_ready_timeout,
        }
    }

    /// Poll `DescribeTable` until the table reports `ACTIVE`.
    async fn wait_until_active(&self, table: &str) -> StoreResult<()> {
        let client = &self.client;
        poll_until_active(
            table,
            self.table_ready_timeout,
            TABLE_POLL_INTERVAL,
            move || async move {
                client
                    .describe_table()
                    .table_name(table)
                    .send()
                    .await
                    .map(|out| out.table().and_then(|t| t.table_status()).cloned())
                    .map_err(|e| sdk_error(e, classify_describe_table))
            },
        )
        .await
    }
}

/// Call `describe` every `interval` until it reports `ACTIVE` or `timeout`
/// elapses.
async fn poll_until_active<F, Fut>(
    table: &str,
    timeout: Duration,
    interval: Duration,
    mut describe: F,
) -> StoreResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<Option<TableStatus>>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        let status = describe().await?;
        if status == Some(TableStatus::Active) {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(StoreError::other(format!(
                "table {table} did not become ACTIVE within {timeout:?}"
            )));
        }
        debug!("Waiting for DynamoDB table {} (status {:?})", table, status);
        tokio::time::sleep(interval).await;
    }
}

/// Finish a `CreateTable` call.
///
/// A table reported as already existing may still be `CREATING` on behalf
/// of another writer, so it is waited on as well before `AlreadyExists` is
/// returned.
async fn settle_create<W>(created: StoreResult<()>, wait: W) -> StoreResult<()>
where
    W: Future<Output = StoreResult<()>>,
{
    match created {
        Ok(()) => wait.await,
        Err(e) if e.kind() == StoreErrorKind::AlreadyExists => {
            wait.await?;
            Err(e)
        }
        Err(e) => Err(e),
    }
}

// ── Error mapping ───────────────────────────────────────────────────

fn sdk_error<E>(err: SdkError<E>, classify: fn(&E) -> StoreErrorKind) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let kind = err
        .as_service_error()
        .map(classify)
        .unwrap_or(StoreErrorKind::Other);
    let message = DisplayErrorContext(&err).to_string();
    StoreError::with_source(kind, message, err)
}

fn classify_create_table(err: &CreateTableError) -> StoreErrorKind {
    match err {
        CreateTableError::ResourceInUseException(_) => StoreErrorKind::AlreadyExists,
        _ => StoreErrorKind::Other,
    }
}

fn classify_describe_table(err: &DescribeTableError) -> StoreErrorKind {
    match err {
        DescribeTableError::ResourceNotFoundException(_) => StoreErrorKind::ResourceNotFound,
        _ => StoreErrorKind::Other,
    }
}

fn classify_get_item(err: &GetItemError) -> StoreErrorKind {
    match err {
        GetItemError::ResourceNotFoundException(_) => StoreErrorKind::ResourceNotFound,
        _ => StoreErrorKind::Other,
    }
}

fn classify_put_item(err: &PutItemError) -> StoreErrorKind {
    match err {
        PutItemError::ConditionalCheckFailedException(_) => StoreErrorKind::ConditionFailed,
        PutItemError::ResourceNotFoundException(_) => StoreErrorKind::ResourceNotFound,
        _ => StoreErrorKind::Other,
    }
}

fn classify_delete_item(err: &DeleteItemError) -> StoreErrorKind {
    match err {
        DeleteItemError::ResourceNotFoundException(_) => StoreErrorKind::ResourceNotFound,
        _ => StoreErrorKind::Other,
    }
}

fn classify_query(err: &QueryError) -> StoreErrorKind {
    match err {
        QueryError::ResourceNotFoundException(_) => StoreErrorKind::ResourceNotFound,
        _ => StoreErrorKind::Other,
    }
}

// ── Item helpers ────────────────────────────────────────────────────

/// Build the DynamoDB primary key map for `key` under `table`'s key schema.
fn key_attributes(
    table: &TableSchema,
    key: ItemKey,
) -> StoreResult<HashMap<String, AttributeValue>> {
    let mut attrs = HashMap::new();
    attrs.insert(table.partition_key.clone(), AttributeValue::S(key.partition));
    match (&table.sort_key, key.sort) {
        (Some(sort_attr), Some(sort)) => {
            attrs.insert(sort_attr.clone(), AttributeValue::S(sort));
        }
        (None, None) => {}
        _ => {
            return Err(StoreError::other(format!(
                "key does not match the key schema of table {}",
                table.name
            )))
        }
    }
    Ok(attrs)
}

/// DynamoDB's `Limit` is a positive `i32`.
fn page_limit(limit: u32) -> i32 {
    i32::try_from(limit.max(1)).unwrap_or(i32::MAX)
}

fn string_attribute(item: &HashMap<String, AttributeValue>, name: &str) -> StoreResult<String> {
    item.get(name)
        .and_then(|v| v.as_s().ok())
        .cloned()
        .ok_or_else(|| StoreError::other(format!("item is missing string attribute {name}")))
}

fn key_element(name: &str, key_type: KeyType) -> StoreResult<KeySchemaElement> {
    KeySchemaElement::builder()
        .attribute_name(name)
        .key_type(key_type)
        .build()
        .map_err(|e| StoreError::with_source(StoreErrorKind::Other, "invalid key schema", e))
}

fn string_definition(name: &str) -> StoreResult<AttributeDefinition> {
    AttributeDefinition::builder()
        .attribute_name(name)
        .attribute_type(ScalarAttributeType::S)
        .build()
        .map_err(|e| {
            StoreError::with_source(StoreErrorKind::Other, "invalid attribute definition", e)
        })
}

impl KeyValueStore for DynamoDbStore {
    fn create_table(
        &self,
        schema: &TableSchema,
    ) -> Pin<Box<dyn Future<Output = StoreResult<()>> + Send + '_>> {
        let schema = schema.clone();
        Box::pin(async move {
            let mut key_schema = vec![key_element(&schema.partition_key, KeyType::Hash)?];
            let mut definitions = vec![string_definition(&schema.partition_key)?];
            if let Some(sort_key) = &schema.sort_key {
                key_schema.push(key_element(sort_key, KeyType::Range)?);
                definitions.push(string_definition(sort_key)?);
            }

            let created = self
                .client
                .create_table()
                .table_name(&schema.name)
                .set_key_schema(Some(key_schema))
                .set_attribute_definitions(Some(definitions))
                .billing_mode(BillingMode::PayPerRequest)
                .send()
                .await
                .map(|_| info!("Created DynamoDB table {}", schema.name))
                .map_err(|e| sdk_error(e, classify_create_table));

            settle_create(created, self.wait_until_active(&schema.name)).await
        })
    }

    fn get(
        &self,
        table: &TableSchema,
        key: ItemKey,
    ) -> Pin<Box<dyn Future<Output = StoreResult<Option<String>>> + Send + '_>> {
        let table = table.clone();
        Box::pin(async move {
            let result = self
                .client
                .get_item()
                .table_name(&table.name)
                .set_key(Some(key_attributes(&table, key)?))
                .consistent_read(true)
                .send()
                .await
                .map_err(|e| sdk_error(e, classify_get_item))?;

            match result.item() {
                Some(item) => Ok(Some(string_attribute(item, VALUE_ATTRIBUTE)?)),
                None => Ok(None),
            }
        })
    }

    fn contains(
        &self,
        table: &TableSchema,
        key: ItemKey,
    ) -> Pin<Box<dyn Future<Output = StoreResult<bool>> + Send + '_>> {
        let table = table.clone();
        Box::pin(async move {
            let result = self
                .client
                .get_item()
                .table_name(&table.name)
                .set_key(Some(key_attributes(&table, key)?))
                .consistent_read(true)
                .projection_expression("#pk")
                .expression_attribute_names("#pk", &table.partition_key)
                .send()
                .await
                .map_err(|e| sdk_error(e, classify_get_item))?;

            Ok(result.item().is_some())
        })
    }

    fn put(
        &self,
        table: &TableSchema,
        key: ItemKey,
        value: String,
        condition: PutCondition,
    ) -> Pin<Box<dyn Future<Output = StoreResult<()>> + Send + '_>> {
        let table = table.clone();
        Box::pin(async move {
            let mut item = key_attributes(&table, key)?;
            item.insert(VALUE_ATTRIBUTE.to_string(), AttributeValue::S(value));

            let mut request = self
                .client
                .put_item()
                .table_name(&table.name)
                .set_item(Some(item));

            if condition == PutCondition::IfAbsent {
                request = request
                    .condition_expression("attribute_not_exists(#pk)")
                    .expression_attribute_names("#pk", &table.partition_key);
            }

            request
                .send()
                .await
                .map_err(|e| sdk_error(e, classify_put_item))?;
            Ok(())
        })
    }

    fn delete(
        &self,
        table: &TableSchema,
        key: ItemKey,
    ) -> Pin<Box<dyn Future<Output = StoreResult<()>> + Send + '_>> {
        let table = table.clone();
        Box::pin(async move {
            self.client
                .delete_item()
                .table_name(&table.name)
                .set_key(Some(key_attributes(&table, key)?))
                .send()
                .await
                .map_err(|e| sdk_error(e, classify_delete_item))?;
            Ok(())
        })
    }

    fn query(
        &self,
        table: &TableSchema,
        query: RangeQuery,
    ) -> Pin<Box<dyn Future<Output = StoreResult<RangePage>> + Send + '_>> {
        let table = table.clone();
        Box::pin(async move {
            let sort_attr = table.sort_key.clone().ok_or_else(|| {
                StoreError::other(format!(
                    "table {} has no sort key and cannot be range-queried",
                    table.name
                ))
            })?;

            let mut condition = "#pk = :pk".to_string();
            let mut request = self
                .client
                .query()
                .table_name(&table.name)
                .consistent_read(true)
                .projection_expression("#sk, #v")
                .expression_attribute_names("#pk", &table.partition_key)
                .expression_attribute_names("#sk", &sort_attr)
                .expression_attribute_names("#v", VALUE_ATTRIBUTE)
                .expression_attribute_values(":pk", AttributeValue::S(query.partition.clone()))
                .set_limit(query.limit.map(page_limit));

            if let Some(prefix) = &query.sort_prefix {
                condition.push_str(" AND begins_with(#sk, :prefix)");
                request =
                    request.expression_attribute_values(":prefix", AttributeValue::S(prefix.clone()));
            }

            if let Some(start) = &query.exclusive_start {
                request = request
                    .exclusive_start_key(&table.partition_key, AttributeValue::S(query.partition.clone()))
                    .exclusive_start_key(&sort_attr, AttributeValue::S(start.clone()));
            }

            let result = request
                .key_condition_expression(condition)
                .send()
                .await
                .map_err(|e| sdk_error(e, classify_query))?;

            let mut page = RangePage::default();
            for item in result.items() {
                page.items.push(RangeItem {
                    sort_key: string_attribute(item, &sort_attr)?,
                    value: string_attribute(item, VALUE_ATTRIBUTE)?,
                });
            }
            page.last_evaluated = match result.last_evaluated_key() {
                Some(last) => Some(string_attribute(last, &sort_attr)?),
                None => None,
            };

            debug!(
                "DynamoDB query: table={} partition={} items={} more={}",
                table.name,
                query.partition,
                page.items.len(),
                page.last_evaluated.is_some()
            );
            Ok(page)
        })
    }
}
