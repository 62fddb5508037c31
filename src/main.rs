use actix_web::{web, App, HttpResponse, HttpServer};
use grade_predictor::analytics::summarize;
use grade_predictor::{
    percentage_to_grade, ArtifactStore, CsvMarkSource, Grade, MarkSource, ModelArtifact, Predictor,
};
use serde::Serialize;
use std::sync::RwLock;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

struct AppState {
    predictor: Predictor<CsvMarkSource>,
    model: RwLock<Option<ModelArtifact>>,
}

#[derive(Serialize)]
struct PredictionResponse {
    student_id: i64,
    subject_id: i64,
    percentage: f64,
    grade: Grade,
}

#[derive(Serialize)]
struct TrainResponse {
    trained: bool,
    message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().body("Grade predictor API is running!")
}

// Retrain from the current corpus and swap the shared model wholesale
async fn train(state: web::Data<AppState>) -> HttpResponse {
    match state.predictor.train_and_save() {
        Ok(true) => {
            let artifact = state.predictor.load_model();
            *state.model.write().unwrap() = artifact;
            HttpResponse::Ok().json(TrainResponse {
                trained: true,
                message: "model retrained from the full mark history".to_string(),
            })
        }
        Ok(false) => HttpResponse::Ok().json(TrainResponse {
            trained: false,
            message: "not enough marks to train a model yet".to_string(),
        }),
        Err(err) => HttpResponse::InternalServerError().json(ErrorResponse {
            error: format!("could not persist the model: {err}"),
        }),
    }
}

async fn predict(path: web::Path<(i64, i64)>, state: web::Data<AppState>) -> HttpResponse {
    let (student_id, subject_id) = path.into_inner();

    if state.model.read().unwrap().is_none() {
        // first use: load lazily, training if the corpus allows it
        let loaded = state.predictor.load_model();
        *state.model.write().unwrap() = loaded;
    }

    let guard = state.model.read().unwrap();
    let Some(artifact) = guard.as_ref() else {
        return HttpResponse::ServiceUnavailable().json(ErrorResponse {
            error: "no model trained yet - add more marks and POST /train".to_string(),
        });
    };

    match state
        .predictor
        .predict_next_percentage(artifact, student_id, subject_id)
    {
        Some(percentage) => HttpResponse::Ok().json(PredictionResponse {
            student_id,
            subject_id,
            percentage,
            grade: percentage_to_grade(percentage),
        }),
        None => HttpResponse::NotFound().json(ErrorResponse {
            error: format!(
                "no prediction possible: student {student_id} has no marks in subject {subject_id}"
            ),
        }),
    }
}

async fn model_info(state: web::Data<AppState>) -> HttpResponse {
    match state.model.read().unwrap().as_ref() {
        Some(artifact) => HttpResponse::Ok().json(artifact.metadata.clone()),
        None => HttpResponse::ServiceUnavailable().json(ErrorResponse {
            error: "no model trained yet".to_string(),
        }),
    }
}

async fn analytics(state: web::Data<AppState>) -> HttpResponse {
    match state.predictor.source().fetch_all_valid_marks() {
        Ok(records) => HttpResponse::Ok().json(summarize(&records)),
        Err(err) => HttpResponse::InternalServerError().json(ErrorResponse {
            error: format!("could not read the mark history: {err}"),
        }),
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let corpus = std::env::args().nth(1).unwrap_or_else(|| "data/marks.csv".to_string());
    let source = match CsvMarkSource::from_path(&corpus) {
        Ok(source) => {
            info!(corpus = %corpus, records = source.len(), "loaded mark history");
            source
        }
        Err(err) => {
            warn!(corpus = %corpus, %err, "could not load mark history, starting empty");
            CsvMarkSource::empty()
        }
    };

    let predictor = Predictor::new(source, ArtifactStore::new(ArtifactStore::default_path()));
    let initial = predictor.load_model();
    match &initial {
        Some(artifact) => info!(
            rows = artifact.metadata.training_rows,
            trees = artifact.metadata.tree_count,
            "model ready"
        ),
        None => warn!("no model yet; predictions unavailable until enough marks exist"),
    }

    let state = web::Data::new(AppState {
        predictor,
        model: RwLock::new(initial),
    });

    info!("starting grade predictor API on http://127.0.0.1:8080");
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/health", web::get().to(health_check))
            .route("/train", web::post().to(train))
            .route("/predict/{student_id}/{subject_id}", web::get().to(predict))
            .route("/model/info", web::get().to(model_info))
            .route("/analytics", web::get().to(analytics))
    })
    .bind(("127.0.0.1", 8080))?
    .run()
    .await
}
