use super::json_error::JsonError;
use crate::{app::AppState, isp::Csi2Receiver, receiver::StreamState};
use axum::{extract::State, Json};
use csi2_json::{PutStream, Stream};

fn state_json(state: StreamState) -> csi2_json::StreamState {
    match state {
        StreamState::Idle => csi2_json::StreamState::Idle,
        StreamState::Streaming => csi2_json::StreamState::Streaming,
        StreamState::Underrun => csi2_json::StreamState::Underrun,
    }
}

pub fn stream_json(receiver: &Csi2Receiver) -> Stream {
    Stream {
        state: state_json(receiver.state()),
    }
}

pub async fn get_stream(State(state): State<AppState>) -> Json<Stream> {
    Json(stream_json(&state.receiver().lock().unwrap()))
}

fn set_streaming(receiver: &mut Csi2Receiver, streaming: bool) -> Result<(), JsonError> {
    if streaming {
        // buffers flushed by a previous stop go back to the receiver
        for buffer in receiver.queue_mut().take_idle() {
            receiver.queue_buffer(buffer);
        }
        receiver.start_stream().map_err(JsonError::receiver_error)
    } else {
        receiver.stop_stream();
        Ok(())
    }
}

pub async fn put_stream(
    State(state): State<AppState>,
    Json(put): Json<PutStream>,
) -> Result<Json<Stream>, JsonError> {
    let mut receiver = state.receiver().lock().unwrap();
    set_streaming(&mut receiver, put.streaming)?;
    Ok(Json(stream_json(&receiver)))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stream_state_json() {
        assert_eq!(
            serde_json::to_string(&Stream {
                state: state_json(StreamState::Underrun)
            })
            .unwrap(),
            r#"{"state":"Underrun"}"#
        );
        assert_eq!(
            state_json(StreamState::Idle),
            csi2_json::StreamState::Idle
        );
    }
}
