//! HTTPハンドラー

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::breed_info::BreedInfo;
use crate::prediction::{BreedScore, Prediction};
use crate::preprocess::{decode_image, prepare_image, to_data_url};
use crate::server::error::ApiError;
use crate::server::state::{AppState, SharedState};

/// アップロードを受け取るマルチパートのフィールド名
pub const FILE_FIELD: &str = "file";

/// `POST /predict/` のレスポンス
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub predicted_breed: String,
    pub confidence: f64,
    pub top3: Vec<BreedScore>,
    pub info: BreedInfo,
    pub image: Option<String>,
}

/// 画像をアップロードして犬種を予測
pub async fn predict(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let contents = read_file_field(&mut multipart).await?;
    if contents.is_empty() {
        return Err(ApiError::empty_file());
    }

    let img = decode_image(&contents).map_err(|e| {
        tracing::debug!(error = %e, bytes = contents.len(), "画像のデコードに失敗しました");
        ApiError::undecodable()
    })?;

    // 推論は重いのでブロッキング用スレッドで実行
    let response = tokio::task::spawn_blocking(move || run_prediction(&state, &img))
        .await
        .map_err(ApiError::prediction_failed)??;

    tracing::info!(
        breed = %response.predicted_breed,
        confidence = response.confidence,
        "予測しました"
    );
    Ok(Json(response))
}

async fn read_file_field(multipart: &mut Multipart) -> Result<Vec<u8>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::multipart(e, "Invalid multipart body"))?
    {
        if field.name() == Some(FILE_FIELD) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::multipart(e, "Could not read upload"))?;
            return Ok(bytes.to_vec());
        }
    }
    Err(ApiError::BadRequest(format!("Missing '{}' field", FILE_FIELD)))
}

/// デコード済み画像に対する予測パイプライン
///
/// data URL 化 -> 前処理 -> 推論 -> 上位3件 -> 犬種情報 の順に実行します。
pub fn run_prediction(state: &AppState, img: &DynamicImage) -> Result<PredictResponse, ApiError> {
    let image = to_data_url(img);

    let model = state.model();
    let batch = prepare_image(img, model.input_size());
    let rows = model.predict(&batch).map_err(ApiError::prediction_failed)?;
    let row = rows
        .first()
        .ok_or_else(|| ApiError::prediction_failed("model returned no output"))?;
    let prediction =
        Prediction::from_probabilities(row, model.categories()).map_err(ApiError::prediction_failed)?;

    let info = state.breed_info().lookup(&prediction.breed);

    Ok(PredictResponse {
        predicted_breed: prediction.breed,
        confidence: prediction.confidence,
        top3: prediction.top,
        info,
        image,
    })
}

/// 死活監視
pub async fn health(State(state): State<SharedState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "categories": state.model().categories().len(),
    }))
}
