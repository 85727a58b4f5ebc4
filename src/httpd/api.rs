use super::{
    format::pad_format_json, json_error::JsonError, links::links_json, stream::stream_json,
};
use crate::{app::AppState, format::Pad, receiver::Stats};
use anyhow::Result;
use axum::{extract::State, Json};

fn stats_json(stats: &Stats) -> csi2_json::Stats {
    csi2_json::Stats {
        frames: stats.frames,
        underruns: stats.underruns,
        transmission_errors: stats.transmission_errors,
    }
}

fn api_json(state: &AppState) -> Result<csi2_json::Api> {
    let receiver = state.receiver().lock().unwrap();
    Ok(csi2_json::Api {
        receiver: csi2_json::Receiver {
            instance: receiver.instance().to_string(),
            revision: receiver.revision().to_string(),
            available: receiver.available(),
        },
        sink: pad_format_json(&receiver.format(Pad::Sink))?,
        source: pad_format_json(&receiver.format(Pad::Source))?,
        links: links_json(&receiver),
        stream: stream_json(&receiver),
        stats: stats_json(receiver.stats()),
    })
}

pub async fn get_api(State(state): State<AppState>) -> Result<Json<csi2_json::Api>, JsonError> {
    api_json(&state).map_err(JsonError::server_error).map(Json)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stats() {
        let stats = Stats {
            frames: 30,
            underruns: 2,
            transmission_errors: 1,
        };
        assert_eq!(
            serde_json::to_string(&stats_json(&stats)).unwrap(),
            r#"{"frames":30,"underruns":2,"transmission_errors":1}"#
        );
    }
}
