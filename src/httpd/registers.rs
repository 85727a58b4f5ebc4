use crate::app::AppState;
use axum::{extract::State, Json};
use csi2_json::{Register, RegisterDump};

pub async fn get_registers(State(state): State<AppState>) -> Json<RegisterDump> {
    let registers = state
        .receiver()
        .lock()
        .unwrap()
        .regdump()
        .into_iter()
        .map(|(name, value)| Register {
            name: name.to_string(),
            value,
        })
        .collect();
    Json(RegisterDump { registers })
}
