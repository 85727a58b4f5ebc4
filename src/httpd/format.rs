use super::json_error::JsonError;
use crate::{
    app::AppState,
    format::{MbusCode, Pad, PadFormat},
    isp::Csi2Receiver,
};
use anyhow::Result;
use axum::{extract::State, Json};
use csi2_json::{PadCode, PadCodes, PixelCode, PutPadFormat};

pub fn pad_format_json(format: &PadFormat) -> Result<csi2_json::PadFormat> {
    Ok(csi2_json::PadFormat {
        code: PixelCode::try_from(format.code)?,
        width: format.width,
        height: format.height,
        colorspace: format.colorspace,
        field: format.field,
    })
}

fn format_json(receiver: &Csi2Receiver, pad: Pad) -> Result<Json<csi2_json::PadFormat>, JsonError> {
    pad_format_json(&receiver.format(pad))
        .map_err(JsonError::server_error)
        .map(Json)
}

// Unknown code names are not rejected. They are replaced when the format is
// adjusted to what the pad supports.
fn requested_format(put: &PutPadFormat) -> PadFormat {
    let code = put
        .code
        .parse::<PixelCode>()
        .map(MbusCode::from)
        .unwrap_or(MbusCode(0));
    PadFormat {
        code,
        width: put.width,
        height: put.height,
        ..Default::default()
    }
}

fn set_format(
    state: &AppState,
    pad: Pad,
    put: &PutPadFormat,
) -> Result<Json<csi2_json::PadFormat>, JsonError> {
    let mut receiver = state.receiver().lock().unwrap();
    receiver
        .set_format(pad, requested_format(put))
        .map_err(JsonError::receiver_error)?;
    format_json(&receiver, pad)
}

fn codes_json(receiver: &Csi2Receiver, pad: Pad) -> Result<PadCodes> {
    let mut codes = Vec::new();
    for code in (0..).map_while(|index| receiver.enum_mbus_code(pad, index)) {
        let Some(size) = receiver.enum_frame_size(pad, code) else {
            continue;
        };
        codes.push(PadCode {
            code: PixelCode::try_from(code)?,
            min_width: size.min_width,
            max_width: size.max_width,
            min_height: size.min_height,
            max_height: size.max_height,
        });
    }
    Ok(PadCodes { codes })
}

macro_rules! pad_handlers {
    ($($pad:ident => $variant:expr),*) => {
        paste::paste! {
            $(
                pub async fn [<get_ $pad _format>](
                    State(state): State<AppState>,
                ) -> Result<Json<csi2_json::PadFormat>, JsonError> {
                    format_json(&state.receiver().lock().unwrap(), $variant)
                }

                pub async fn [<put_ $pad _format>](
                    State(state): State<AppState>,
                    Json(put): Json<PutPadFormat>,
                ) -> Result<Json<csi2_json::PadFormat>, JsonError> {
                    set_format(&state, $variant, &put)
                }

                pub async fn [<get_ $pad _codes>](
                    State(state): State<AppState>,
                ) -> Result<Json<PadCodes>, JsonError> {
                    codes_json(&state.receiver().lock().unwrap(), $variant)
                        .map_err(JsonError::server_error)
                        .map(Json)
                }
            )*
        }
    }
}

pad_handlers!(sink => Pad::Sink, source => Pad::Source);
