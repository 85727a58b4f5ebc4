use super::json_error::JsonError;
use crate::{
    app::AppState,
    format::{Output, Pad},
    isp::Csi2Receiver,
    receiver::Remote,
};
use axum::{extract::State, Json};
use csi2_json::{Links, PatchLinks};

pub fn links_json(receiver: &Csi2Receiver) -> Links {
    let output = receiver.output();
    Links {
        memory: output.contains(Output::MEMORY),
        cascade: output.contains(Output::CASCADE),
    }
}

fn get_links_json(state: &AppState) -> Json<Links> {
    Json(links_json(&state.receiver().lock().unwrap()))
}

pub async fn get_links(State(state): State<AppState>) -> Json<Links> {
    get_links_json(&state)
}

fn update_links(state: &AppState, patch: &PatchLinks) -> Result<(), JsonError> {
    let mut receiver = state.receiver().lock().unwrap();
    if let Some(memory) = patch.memory {
        receiver
            .link_setup(Pad::Source, Remote::VideoNode, memory)
            .map_err(JsonError::receiver_error)?;
    }
    if let Some(cascade) = patch.cascade {
        receiver
            .link_setup(Pad::Source, Remote::Subdev, cascade)
            .map_err(JsonError::receiver_error)?;
    }
    Ok(())
}

pub async fn put_links(
    State(state): State<AppState>,
    Json(put): Json<Links>,
) -> Result<Json<Links>, JsonError> {
    update_links(&state, &PatchLinks::from(put))?;
    Ok(get_links_json(&state))
}

pub async fn patch_links(
    State(state): State<AppState>,
    Json(patch): Json<PatchLinks>,
) -> Result<Json<Links>, JsonError> {
    update_links(&state, &patch)?;
    Ok(get_links_json(&state))
}
