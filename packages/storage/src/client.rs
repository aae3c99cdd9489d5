//! Typed reads and writes of archive records.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tethys_identity::{ChunkCoords, IdHasher};
use tethys_keys::{KeyParams, KeyRegistry, Role};
use tethys_models::{
    Dataset, DatasetStation, Record, RecordError, ResultChunk, ResultVersion, Rule,
    ValidationError, Violation, Violations, check_provenance,
};

use crate::StorageError;
use crate::codec::{Codec, ZstdCodec};
use crate::store::{ObjectStore, PutOutcome};

/// Client for one archive, at one schema version.
///
/// Every write validates before touching the store; every read validates
/// after parsing.
#[derive(Debug)]
pub struct TethysClient<S, C = ZstdCodec> {
    store: S,
    codec: C,
    registry: KeyRegistry,
    version: u32,
}

impl<S: ObjectStore> TethysClient<S> {
    /// Creates a client over `store` using the built-in layouts and zstd.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Key`] if `version` has no built-in layout.
    pub fn new(store: S, version: u32) -> Result<Self, StorageError> {
        Self::with_parts(store, ZstdCodec::default(), KeyRegistry::builtin(), version)
    }
}

impl<S: ObjectStore, C: Codec> TethysClient<S, C> {
    /// Creates a client from explicit parts.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Key`] if `registry` has no layout for
    /// `version`.
    pub fn with_parts(
        store: S,
        codec: C,
        registry: KeyRegistry,
        version: u32,
    ) -> Result<Self, StorageError> {
        registry.layout(version)?;
        Ok(Self {
            store,
            codec,
            registry,
            version,
        })
    }

    /// Schema version the client renders keys for.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// The underlying object store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Renders the key of `role` under this client's schema version.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Key`] if the role is not part of the layout
    /// or a parameter is missing or invalid.
    pub fn key(&self, role: Role, params: &KeyParams) -> Result<String, StorageError> {
        Ok(self.registry.render(self.version, role, params)?)
    }

    /// Lists every stored key of this schema version.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn list_keys(&self) -> Result<Vec<String>, StorageError> {
        let prefix = self.registry.prefix(self.version)?;
        self.store.list(&prefix).await
    }

    // ── Datasets ────────────────────────────────────────────────────

    /// Writes one dataset's metadata.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Validation`] if the dataset is invalid, or
    /// store errors.
    pub async fn put_dataset(&self, dataset: &Dataset) -> Result<PutOutcome, StorageError> {
        ValidationError::check(Dataset::KIND, dataset.validate())?;
        let key = self.dataset_key(Role::Dataset, &dataset.dataset_id)?;
        self.put_json(&key, Dataset::KIND, dataset).await
    }

    /// Reads one dataset's metadata.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if it is not stored, and
    /// [`StorageError::Record`] if it does not parse or validate.
    pub async fn get_dataset(&self, dataset_id: &str) -> Result<Dataset, StorageError> {
        let key = self.dataset_key(Role::Dataset, dataset_id)?;
        self.get_record(&key).await
    }

    /// Writes the catalog-wide dataset list.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Validation`] if any dataset is invalid or
    /// parent references form a cycle, or store errors.
    pub async fn put_datasets(&self, datasets: &[Dataset]) -> Result<PutOutcome, StorageError> {
        let mut v = Violations::new();
        v.nest("", list_violations(datasets, Dataset::validate));
        v.nest("", check_provenance(datasets));
        ValidationError::check(Dataset::KIND, v.into_vec())?;

        let key = self.key(Role::Datasets, &KeyParams::new())?;
        self.put_json(&key, Dataset::KIND, datasets).await
    }

    /// Reads the catalog-wide dataset list.
    ///
    /// # Errors
    ///
    /// See [`TethysClient::get_dataset`].
    pub async fn get_datasets(&self) -> Result<Vec<Dataset>, StorageError> {
        let key = self.key(Role::Datasets, &KeyParams::new())?;
        self.get_record(&key).await
    }

    // ── Stations ────────────────────────────────────────────────────

    /// Writes one station of `dataset`, chunks included.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Validation`] if the station is not valid
    /// for the dataset, or store errors.
    pub async fn put_station(
        &self,
        dataset: &Dataset,
        station: &DatasetStation,
    ) -> Result<PutOutcome, StorageError> {
        ValidationError::check(DatasetStation::KIND, station.validate_for(dataset))?;
        let params = KeyParams::new()
            .dataset_id(&dataset.dataset_id)
            .station_id(station.station_id());
        let key = self.key(Role::Station, &params)?;
        self.put_json(&key, DatasetStation::KIND, station).await
    }

    /// Reads one station, chunks included.
    ///
    /// # Errors
    ///
    /// See [`TethysClient::get_dataset`].
    pub async fn get_station(
        &self,
        dataset_id: &str,
        station_id: &str,
    ) -> Result<DatasetStation, StorageError> {
        let params = KeyParams::new()
            .dataset_id(dataset_id)
            .station_id(station_id);
        let key = self.key(Role::Station, &params)?;
        self.get_record(&key).await
    }

    /// Writes the station list of `dataset`; chunk lists are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Validation`] if any station is not valid for
    /// the dataset, or store errors.
    pub async fn put_stations(
        &self,
        dataset: &Dataset,
        stations: &[DatasetStation],
    ) -> Result<PutOutcome, StorageError> {
        let list: Vec<DatasetStation> = stations
            .iter()
            .map(DatasetStation::without_chunks)
            .collect();
        ValidationError::check(
            DatasetStation::KIND,
            list_violations(&list, |station| station.validate_for(dataset)),
        )?;

        let key = self.dataset_key(Role::Stations, &dataset.dataset_id)?;
        self.put_json(&key, DatasetStation::KIND, &list).await
    }

    /// Reads the station list of a dataset.
    ///
    /// # Errors
    ///
    /// See [`TethysClient::get_dataset`].
    pub async fn get_stations(
        &self,
        dataset_id: &str,
    ) -> Result<Vec<DatasetStation>, StorageError> {
        let key = self.dataset_key(Role::Stations, dataset_id)?;
        self.get_record(&key).await
    }

    // ── Versions ────────────────────────────────────────────────────

    /// Writes the results versions of a dataset.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Validation`] if a version is invalid or
    /// belongs to another dataset, [`StorageError::Key`] for layouts
    /// without a versions object, or store errors.
    pub async fn put_versions(
        &self,
        dataset_id: &str,
        versions: &[ResultVersion],
    ) -> Result<PutOutcome, StorageError> {
        let violations = list_violations(versions, |version| {
            let mut v = Violations::new();
            v.nest("", version.validate());
            v.ensure(
                version.dataset_id == dataset_id,
                "dataset_id",
                Rule::Reference,
                format!("version belongs to {}", version.dataset_id),
            );
            v.into_vec()
        });
        ValidationError::check(ResultVersion::KIND, violations)?;

        let key = self.dataset_key(Role::Versions, dataset_id)?;
        self.put_json(&key, ResultVersion::KIND, versions).await
    }

    /// Reads the results versions of a dataset.
    ///
    /// # Errors
    ///
    /// See [`TethysClient::get_dataset`].
    pub async fn get_versions(&self, dataset_id: &str) -> Result<Vec<ResultVersion>, StorageError> {
        let key = self.dataset_key(Role::Versions, dataset_id)?;
        self.get_record(&key).await
    }

    // ── Result chunks ───────────────────────────────────────────────

    /// Compresses and stores one chunk of a station's results.
    ///
    /// The chunk id is derived from `coords` and the content hash from the
    /// stored (compressed) bytes. The described chunk is validated against
    /// `dataset` before anything is written.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Identity`] for out-of-range coordinates,
    /// [`StorageError::Validation`] if the chunk does not fit the dataset,
    /// [`StorageError::Codec`] if compression fails, or store errors.
    pub async fn put_result_chunk(
        &self,
        dataset: &Dataset,
        station_id: &str,
        coords: ChunkCoords,
        version_date: DateTime<Utc>,
        content: &[u8],
    ) -> Result<ResultChunk, StorageError> {
        let version_date = tethys_models::datetime::truncate(version_date);
        let chunk_id = IdHasher::default().chunk_id(&coords)?;
        let params = KeyParams::new()
            .dataset_id(&dataset.dataset_id)
            .station_id(station_id)
            .chunk_id(&chunk_id)
            .version_date(&version_date)
            .run_date(&version_date);
        let key = self.key(Role::Results, &params)?;

        let stored = self
            .codec
            .compress(content)
            .map_err(|source| StorageError::Codec {
                key: key.clone(),
                source,
            })?;
        let chunk = ResultChunk::new(
            dataset.dataset_id.clone(),
            station_id,
            coords,
            version_date,
            key,
            &stored,
        )?;
        ValidationError::check(ResultChunk::KIND, chunk.validate_for(dataset))?;

        let outcome = self.store.put(&chunk.key, stored).await?;
        log::info!(
            "Stored chunk {} of station {station_id} ({} bytes, {outcome:?})",
            chunk.chunk_id,
            chunk.content_length
        );
        Ok(chunk)
    }

    /// Fetches a chunk's content, verifying its hash.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::HashMismatch`] if the stored bytes do not
    /// match `chunk.chunk_hash`, [`StorageError::Codec`] if they do not
    /// decompress, or store errors.
    pub async fn get_result_chunk(&self, chunk: &ResultChunk) -> Result<Vec<u8>, StorageError> {
        let stored = self.store.get(&chunk.key).await?;
        let actual = IdHasher::default().content_hash(&stored)?;
        if actual != chunk.chunk_hash {
            log::warn!("Chunk {} at {} is corrupt", chunk.chunk_id, chunk.key);
            return Err(StorageError::HashMismatch {
                key: chunk.key.clone(),
                expected: chunk.chunk_hash.clone(),
                actual,
            });
        }
        self.decode(&chunk.key, &stored)
    }

    // ── Internals ───────────────────────────────────────────────────

    fn dataset_key(&self, role: Role, dataset_id: &str) -> Result<String, StorageError> {
        self.key(role, &KeyParams::new().dataset_id(dataset_id))
    }

    fn decode(&self, key: &str, stored: &[u8]) -> Result<Vec<u8>, StorageError> {
        self.codec
            .decompress(stored)
            .map_err(|source| StorageError::Codec {
                key: key.to_string(),
                source,
            })
    }

    async fn put_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        kind: &'static str,
        value: &T,
    ) -> Result<PutOutcome, StorageError> {
        let json =
            serde_json::to_vec(value).map_err(|source| RecordError::Serialize { kind, source })?;
        let stored = self
            .codec
            .compress(&json)
            .map_err(|source| StorageError::Codec {
                key: key.to_string(),
                source,
            })?;
        let outcome = self.store.put(key, stored).await?;
        log::debug!("Wrote {kind} to {key} ({outcome:?})");
        Ok(outcome)
    }

    async fn get_record<R: Record>(&self, key: &str) -> Result<R, StorageError> {
        let stored = self.store.get(key).await?;
        let json = self.decode(key, &stored)?;
        Ok(R::from_json(&json)?)
    }
}

/// Violations of every list element, nested under its index.
fn list_violations<T>(items: &[T], validate: impl Fn(&T) -> Vec<Violation>) -> Vec<Violation> {
    let mut v = Violations::new();
    for (index, item) in items.iter().enumerate() {
        v.nest(&format!("[{index}]"), validate(item));
    }
    v.into_vec()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tethys_geometry::Geometry;
    use tethys_keys::KeyError;
    use tethys_models::{
        ChunkParams, ChunkSummary, DatasetIdentity, ResultDims, ResultType, Station, Stats,
        TimeRange, TimeSeriesDims, chunk_window,
    };

    use super::*;
    use crate::MemoryStore;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn dataset(result_type: ResultType) -> Dataset {
        owned_dataset(result_type, "Environment Southland")
    }

    fn owned_dataset(result_type: ResultType, owner: &str) -> Dataset {
        let identity = DatasetIdentity {
            feature: "waterway".to_string(),
            parameter: "streamflow".to_string(),
            method: "sensor_recording".to_string(),
            product_code: "raw_data".to_string(),
            owner: owner.to_string(),
            aggregation_statistic: "mean".to_string(),
            frequency_interval: "1H".to_string(),
            utc_offset: "0H".to_string(),
        };
        let mut dataset = Dataset::new(
            identity,
            "m3/s",
            "https://creativecommons.org/licenses/by/4.0/",
            "Data licensed by Environment Southland",
            result_type,
            0.001,
        )
        .unwrap();
        if result_type == ResultType::TimeSeries {
            dataset.chunk_parameters = Some(ChunkParams {
                block_length: Some(0.0),
                time_interval: Some(7),
            });
        }
        dataset
    }

    fn client() -> TethysClient<MemoryStore> {
        TethysClient::new(MemoryStore::new(), 4).unwrap()
    }

    fn coords(chunk_day: i32) -> ChunkCoords {
        ChunkCoords {
            height: Some(0),
            chunk_day: Some(chunk_day),
            band: None,
        }
    }

    #[tokio::test]
    async fn dataset_round_trips_through_the_store() {
        let client = client();
        let dataset = dataset(ResultType::TimeSeries);
        client.put_dataset(&dataset).await.unwrap();

        let keys = client.list_keys().await.unwrap();
        assert_eq!(keys, vec!["tethys/v4/445cab7cb3a13f827e722c2a.dataset.json.zst"]);
        assert_eq!(client.get_dataset(&dataset.dataset_id).await.unwrap(), dataset);

        assert_eq!(
            client.put_dataset(&dataset).await.unwrap(),
            PutOutcome::Unchanged
        );
    }

    #[tokio::test]
    async fn invalid_records_are_never_written() {
        let client = client();
        let mut dataset = dataset(ResultType::TimeSeries);
        dataset.precision = -1.0;

        let result = client.put_dataset(&dataset).await;
        assert!(
            matches!(
                &result,
                Err(StorageError::Validation(e)) if e.has("precision", Rule::NotPositive)
            ),
            "{result:?}"
        );
        assert!(client.store().is_empty().await);
    }

    #[tokio::test]
    async fn invalid_stored_records_fail_to_read() {
        let client = client();
        let mut dataset = dataset(ResultType::TimeSeries);
        dataset.dataset_id = "0".repeat(24);
        let json = serde_json::to_vec(&dataset).unwrap();
        let key = client
            .key(Role::Dataset, &KeyParams::new().dataset_id(&dataset.dataset_id))
            .unwrap();
        client
            .store()
            .insert_raw(key, ZstdCodec::default().compress(&json).unwrap())
            .await;

        let result = client.get_dataset(&dataset.dataset_id).await;
        assert!(
            matches!(
                &result,
                Err(StorageError::Record(RecordError::Validation(e)))
                    if e.has("dataset_id", Rule::IdMismatch)
            ),
            "{result:?}"
        );
    }

    #[tokio::test]
    async fn provenance_cycles_are_refused() {
        let client = client();
        let mut a = dataset(ResultType::TimeSeries);
        a.parent_datasets = Some(vec!["b".repeat(24)]);
        let mut b = owned_dataset(ResultType::Trajectory, "Environment Canterbury");
        b.parent_datasets = Some(vec![a.dataset_id.clone()]);
        a.parent_datasets = Some(vec![b.dataset_id.clone()]);

        let result = client.put_datasets(&[a.clone(), b.clone()]).await;
        assert!(
            matches!(
                &result,
                Err(StorageError::Validation(e))
                    if e.violations.iter().any(|v| v.rule == Rule::Cycle)
            ),
            "{result:?}"
        );

        b.parent_datasets = None;
        client.put_datasets(&[a.clone(), b.clone()]).await.unwrap();
        assert_eq!(client.get_datasets().await.unwrap(), vec![a, b]);
    }

    #[tokio::test]
    async fn chunks_are_verified_on_read() {
        let client = client();
        let dataset = dataset(ResultType::TimeSeries);
        let station = Station::new(Geometry::point(168.35, -46.41)).unwrap();
        let content = b"netcdf bytes".repeat(10);

        let chunk = client
            .put_result_chunk(
                &dataset,
                &station.station_id,
                coords(18_256),
                at(2021, 1, 1),
                &content,
            )
            .await
            .unwrap();
        assert_eq!(chunk.chunk_id, IdHasher::default().chunk_id(&coords(18_256)).unwrap());
        assert_eq!(
            chunk.key,
            format!(
                "tethys/v4/{}.{}.{}.20210101T000000Z.results.nc.zst",
                dataset.dataset_id, station.station_id, chunk.chunk_id
            )
        );
        assert_eq!(client.get_result_chunk(&chunk).await.unwrap(), content);

        client.store().insert_raw(chunk.key.clone(), b"tampered".to_vec()).await;
        assert!(matches!(
            client.get_result_chunk(&chunk).await,
            Err(StorageError::HashMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn chunk_must_fit_dataset_before_upload() {
        let client = client();
        let dataset = dataset(ResultType::Trajectory);

        let result = client
            .put_result_chunk(&dataset, &"1".repeat(24), coords(18_256), at(2021, 1, 1), b"x")
            .await;
        match result {
            Err(StorageError::Validation(e)) => {
                assert!(e.has("height", Rule::DimensionForbidden), "{e}");
                assert!(e.has("chunk_day", Rule::DimensionForbidden), "{e}");
            }
            other => panic!("expected a validation error, got {other:?}"),
        }
        assert!(client.store().is_empty().await);
    }

    #[tokio::test]
    async fn ingest_updates_station_and_lists() {
        let client = client();
        let dataset = dataset(ResultType::TimeSeries);
        let station = Station::new(Geometry::point(168.35, -46.41)).unwrap();
        let version = ResultVersion::new(&dataset.dataset_id, at(2021, 1, 1), at(2021, 1, 1));

        let chunk = client
            .put_result_chunk(
                &dataset,
                &station.station_id,
                coords(18_256),
                version.version_date,
                b"week one",
            )
            .await
            .unwrap();
        let entry = DatasetStation::from_first_chunk(
            station,
            &dataset,
            ResultDims::TimeSeries(TimeSeriesDims {
                time: 168,
                geometry: 1,
                height: 1,
            }),
            chunk,
            &ChunkSummary {
                time_range: chunk_window(18_256, 7).unwrap(),
                stats: Stats::from_values(&[1.0, 2.0]),
            },
            at(2021, 1, 2),
        )
        .unwrap();

        client.put_station(&dataset, &entry).await.unwrap();
        client.put_stations(&dataset, &[entry.clone()]).await.unwrap();
        client.put_versions(&dataset.dataset_id, &[version.clone()]).await.unwrap();

        let stored = client
            .get_station(&dataset.dataset_id, entry.station_id())
            .await
            .unwrap();
        assert_eq!(stored, entry);

        let list = client.get_stations(&dataset.dataset_id).await.unwrap();
        assert_eq!(list, vec![entry.without_chunks()]);
        assert!(list[0].results_chunks.is_none());

        assert_eq!(
            client.get_versions(&dataset.dataset_id).await.unwrap(),
            vec![version]
        );
        assert_eq!(
            list[0].time_range,
            TimeRange::new(at(2019, 12, 26), chunk_window(18_256, 7).unwrap().to_date)
        );
    }

    #[tokio::test]
    async fn older_layouts_render_their_own_keys() {
        let client = TethysClient::new(MemoryStore::new(), 2).unwrap();
        let dataset = dataset(ResultType::TimeSeries);
        let chunk = client
            .put_result_chunk(&dataset, &"1".repeat(24), coords(18_256), at(2021, 1, 1), b"x")
            .await
            .unwrap();
        assert_eq!(
            chunk.key,
            format!(
                "tethys/v2/{}/{}/20210101T000000Z/results.nc.zst",
                dataset.dataset_id,
                "1".repeat(24)
            )
        );

        let result = client.put_versions(&dataset.dataset_id, &[]).await;
        assert!(
            matches!(
                &result,
                Err(StorageError::Key(KeyError::UnknownRole { version: 2, role: Role::Versions }))
            ),
            "{result:?}"
        );

        assert!(matches!(
            TethysClient::new(MemoryStore::new(), 1),
            Err(StorageError::Key(KeyError::UnknownSchemaVersion { version: 1 }))
        ));
    }
}
