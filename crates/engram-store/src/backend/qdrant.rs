//! Qdrant adapter for the vector backend contract.
//!
//! Collections are created with a single *named* vector slot whose name is
//! the owning model's display-name slug; every search and upsert addresses
//! that slot explicitly. HNSW tuning and optional scalar quantization are
//! applied at create time.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, vectors_config::Config as VectorsKind,
    vectors_output::VectorsOptions, CollectionStatus, CreateCollectionBuilder,
    DeletePointsBuilder, Distance as QdrantDistance, GetPointsBuilder, HnswConfigDiffBuilder,
    PointId, PointStruct, PointsIdsList, QuantizationType, ScalarQuantizationBuilder,
    SearchPointsBuilder, SetPayloadPointsBuilder, UpsertPointsBuilder, VectorParams,
    VectorParamsMap, VectorsConfig,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::{Map, Value};
use tracing::{debug, info};

use engram_config::BackendSettings;
use engram_embeddings::Distance;

use crate::error::{Result, StoreError};

use super::{
    CollectionGeometry, PointData, ScoredHit, StoredPoint, VectorBackend, VectorSlot, VectorSpec,
};

/// Qdrant-backed implementation of [`VectorBackend`].
pub struct QdrantBackend {
    client: Qdrant,
}

impl QdrantBackend {
    /// Connect to a Qdrant server and verify the connection.
    pub async fn connect(settings: &BackendSettings) -> Result<Self> {
        info!("Connecting to Qdrant at {}", settings.url);

        let mut builder =
            Qdrant::from_url(&settings.url).timeout(Duration::from_secs(settings.timeout_secs));

        if let Some(ref api_key) = settings.api_key {
            builder = builder.api_key(api_key.clone());
        }

        let client = builder.build().map_err(|e| {
            StoreError::BackendUnavailable(format!("failed to build Qdrant client: {e}"))
        })?;

        // Test connection by listing collections
        client.list_collections().await.map_err(|e| {
            StoreError::BackendUnavailable(format!("failed to connect to Qdrant: {e}"))
        })?;

        info!("Successfully connected to Qdrant");

        Ok(Self { client })
    }
}

#[async_trait]
impl VectorBackend for QdrantBackend {
    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        Ok(self.client.collection_exists(collection).await?)
    }

    async fn create_collection(&self, collection: &str, spec: &VectorSpec) -> Result<()> {
        info!(
            "Creating collection '{}' (vector='{}', dim={}, distance={})",
            collection, spec.vector_name, spec.dimensions, spec.distance
        );

        let vectors_config = VectorsConfig {
            config: Some(VectorsKind::ParamsMap(VectorParamsMap {
                map: HashMap::from([(
                    spec.vector_name.clone(),
                    VectorParams {
                        size: spec.dimensions,
                        distance: to_qdrant_distance(spec.distance).into(),
                        ..Default::default()
                    },
                )]),
            })),
        };

        let mut builder = CreateCollectionBuilder::new(collection)
            .vectors_config(vectors_config)
            .hnsw_config(
                HnswConfigDiffBuilder::default()
                    .m(spec.hnsw_m)
                    .ef_construct(spec.hnsw_ef_construct),
            );

        if spec.quantization {
            builder = builder.quantization_config(
                ScalarQuantizationBuilder::default()
                    .r#type(QuantizationType::Int8.into())
                    .always_ram(true),
            );
        }

        self.client.create_collection(builder).await?;

        info!("Collection '{}' created successfully", collection);
        Ok(())
    }

    async fn describe_collection(&self, collection: &str) -> Result<Option<CollectionGeometry>> {
        if !self.client.collection_exists(collection).await? {
            return Ok(None);
        }

        let response = self.client.collection_info(collection).await?;
        let Some(info) = response.result else {
            return Ok(None);
        };

        let mut geometry = CollectionGeometry {
            points_count: info.points_count.unwrap_or(0),
            status: status_label(info.status),
            segments_count: Some(info.segments_count),
            optimizer_status: info.optimizer_status.map(|s| {
                if s.ok {
                    "ok".to_string()
                } else {
                    s.error
                }
            }),
            ..Default::default()
        };

        if let Some(config) = info.config {
            if let Some(hnsw) = config.hnsw_config {
                geometry.hnsw_m = hnsw.m;
                geometry.hnsw_ef_construct = hnsw.ef_construct;
            }
            geometry.quantization = config.quantization_config.is_some();

            if let Some(vectors) = config.params.and_then(|p| p.vectors_config) {
                match vectors.config {
                    Some(VectorsKind::Params(params)) => {
                        // Unnamed default slot; keyed by the empty string so
                        // the manager can flag it as foreign geometry.
                        geometry.vectors.insert(String::new(), vector_slot(&params));
                    }
                    Some(VectorsKind::ParamsMap(map)) => {
                        for (name, params) in map.map {
                            geometry.vectors.insert(name, vector_slot(&params));
                        }
                    }
                    None => {}
                }
            }
        }

        Ok(Some(geometry))
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let response = self.client.list_collections().await?;
        Ok(response
            .collections
            .into_iter()
            .map(|c| c.name)
            .collect())
    }

    async fn upsert_points(
        &self,
        collection: &str,
        vector_name: &str,
        points: Vec<PointData>,
    ) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        debug!("Upserting {} points to '{}'", points.len(), collection);

        let qdrant_points: Vec<PointStruct> = points
            .into_iter()
            .map(|p| {
                let payload = Payload::try_from(Value::Object(p.payload)).map_err(|e| {
                    StoreError::Internal(format!("failed to convert payload: {e}"))
                })?;
                let vectors = HashMap::from([(vector_name.to_string(), p.vector)]);
                Ok(PointStruct::new(p.id, vectors, payload))
            })
            .collect::<Result<Vec<_>>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, qdrant_points).wait(true))
            .await?;

        Ok(())
    }

    async fn search_points(
        &self,
        collection: &str,
        vector_name: &str,
        vector: Vec<f32>,
        limit: u64,
        score_threshold: f32,
    ) -> Result<Vec<ScoredHit>> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(collection, vector, limit)
                    .vector_name(vector_name.to_string())
                    .score_threshold(score_threshold)
                    .with_payload(true),
            )
            .await?;

        let hits = response
            .result
            .into_iter()
            .filter_map(|point| {
                let id = point_id_string(point.id?)?;
                Some(ScoredHit {
                    id,
                    score: point.score,
                    payload: payload_to_json(point.payload),
                })
            })
            .collect();

        Ok(hits)
    }

    async fn retrieve_points(
        &self,
        collection: &str,
        vector_name: &str,
        ids: &[String],
        with_vector: bool,
    ) -> Result<Vec<StoredPoint>> {
        let point_ids: Vec<PointId> = ids.iter().map(|id| PointId::from(id.as_str())).collect();

        let response = self
            .client
            .get_points(
                GetPointsBuilder::new(collection, point_ids)
                    .with_payload(true)
                    .with_vectors(with_vector),
            )
            .await?;

        let points = response
            .result
            .into_iter()
            .filter_map(|point| {
                let id = point_id_string(point.id?)?;
                let vector = point
                    .vectors
                    .and_then(|v| named_vector(v.vectors_options?, vector_name));
                Some(StoredPoint {
                    id,
                    payload: payload_to_json(point.payload),
                    vector,
                })
            })
            .collect();

        Ok(points)
    }

    async fn set_payload(
        &self,
        collection: &str,
        ids: &[String],
        payload: Map<String, Value>,
        key: Option<&str>,
    ) -> Result<()> {
        let payload = Payload::try_from(Value::Object(payload))
            .map_err(|e| StoreError::Internal(format!("failed to convert payload: {e}")))?;

        let selector = PointsIdsList {
            ids: ids.iter().map(|id| PointId::from(id.as_str())).collect(),
        };

        let mut builder =
            SetPayloadPointsBuilder::new(collection, payload).points_selector(selector);

        if let Some(key) = key {
            builder = builder.key(key.to_string());
        }

        self.client.set_payload(builder.wait(true)).await?;

        Ok(())
    }

    async fn delete_points(&self, collection: &str, ids: &[String]) -> Result<()> {
        debug!("Deleting {} points from '{}'", ids.len(), collection);

        let selector = PointsIdsList {
            ids: ids.iter().map(|id| PointId::from(id.as_str())).collect(),
        };

        self.client
            .delete_points(
                DeletePointsBuilder::new(collection)
                    .points(selector)
                    .wait(true),
            )
            .await?;

        Ok(())
    }
}

// ============================================================================
// Conversions
// ============================================================================

fn to_qdrant_distance(distance: Distance) -> QdrantDistance {
    match distance {
        Distance::Cosine => QdrantDistance::Cosine,
        Distance::Dot => QdrantDistance::Dot,
        Distance::Euclid => QdrantDistance::Euclid,
    }
}

fn from_qdrant_distance(raw: i32) -> Option<Distance> {
    match QdrantDistance::try_from(raw).ok()? {
        QdrantDistance::Cosine => Some(Distance::Cosine),
        QdrantDistance::Dot => Some(Distance::Dot),
        QdrantDistance::Euclid => Some(Distance::Euclid),
        _ => None,
    }
}

fn vector_slot(params: &VectorParams) -> VectorSlot {
    VectorSlot {
        dimensions: params.size,
        distance: from_qdrant_distance(params.distance),
    }
}

fn status_label(raw: i32) -> String {
    match CollectionStatus::try_from(raw) {
        Ok(CollectionStatus::Green) => "green".to_string(),
        Ok(CollectionStatus::Yellow) => "yellow".to_string(),
        Ok(CollectionStatus::Red) => "red".to_string(),
        Ok(CollectionStatus::Grey) => "grey".to_string(),
        _ => "unknown".to_string(),
    }
}

fn point_id_string(id: PointId) -> Option<String> {
    match id.point_id_options? {
        PointIdOptions::Uuid(uuid) => Some(uuid),
        PointIdOptions::Num(num) => Some(num.to_string()),
    }
}

fn payload_to_json(
    payload: HashMap<String, qdrant_client::qdrant::Value>,
) -> Map<String, Value> {
    payload
        .into_iter()
        .map(|(k, v)| (k, qdrant_value_to_json(v)))
        .collect()
}

/// Convert a Qdrant payload value to JSON, preserving nesting.
fn qdrant_value_to_json(value: qdrant_client::qdrant::Value) -> Value {
    use qdrant_client::qdrant::value::Kind;

    match value.kind {
        None | Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.into_iter().map(qdrant_value_to_json).collect())
        }
        Some(Kind::StructValue(object)) => Value::Object(
            object
                .fields
                .into_iter()
                .map(|(k, v)| (k, qdrant_value_to_json(v)))
                .collect(),
        ),
    }
}

fn named_vector(options: VectorsOptions, vector_name: &str) -> Option<Vec<f32>> {
    match options {
        VectorsOptions::Vector(vector) => Some(vector.data),
        VectorsOptions::Vectors(named) => {
            named.vectors.get(vector_name).map(|v| v.data.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_conversions() {
        assert_eq!(to_qdrant_distance(Distance::Cosine), QdrantDistance::Cosine);
        assert_eq!(
            from_qdrant_distance(QdrantDistance::Cosine as i32),
            Some(Distance::Cosine)
        );
        assert_eq!(
            from_qdrant_distance(QdrantDistance::Manhattan as i32),
            None
        );
    }

    #[test]
    fn test_point_id_string() {
        let uuid = PointId::from("3fa85f64-5717-4562-b3fc-2c963f66afa6");
        assert_eq!(
            point_id_string(uuid).as_deref(),
            Some("3fa85f64-5717-4562-b3fc-2c963f66afa6")
        );

        let num = PointId::from(42u64);
        assert_eq!(point_id_string(num).as_deref(), Some("42"));
    }

    #[test]
    fn test_status_label() {
        assert_eq!(status_label(CollectionStatus::Green as i32), "green");
        assert_eq!(status_label(-1), "unknown");
    }

    #[test]
    fn test_qdrant_value_to_json_preserves_nesting() {
        use qdrant_client::qdrant::value::Kind;
        use qdrant_client::qdrant::{ListValue, Struct, Value as QValue};
        use serde_json::json;

        let kind = |k: Kind| QValue { kind: Some(k) };

        let value = kind(Kind::StructValue(Struct {
            fields: HashMap::from([
                ("count".to_string(), kind(Kind::IntegerValue(2))),
                (
                    "tags".to_string(),
                    kind(Kind::ListValue(ListValue {
                        values: vec![
                            kind(Kind::StringValue("a".to_string())),
                            kind(Kind::BoolValue(true)),
                        ],
                    })),
                ),
            ]),
        }));

        assert_eq!(
            qdrant_value_to_json(value),
            json!({"count": 2, "tags": ["a", true]})
        );
        assert_eq!(qdrant_value_to_json(QValue { kind: None }), json!(null));
    }
}
