//! Synthetic volume streamed by the binary when no data is supplied.

use crate::error::TunnelvisionError;

use models::{ArrayPayload, ModelError, Window};
use viewer_client::session::{ImshowOptions, SessionContext, ViewSession};

use std::future::Future;

use log::info;

/// Hounsfield value of air.
pub const AIR_HU: i16 = -1000;

/// Hounsfield value of the soft tissue sphere.
pub const TISSUE_HU: i16 = 40;

/// A cube of air holding a centered soft tissue sphere.
///
/// The payload has shape `[1, side, side, side, 1]` and `int16` elements, which
/// suits any of the CT window presets.
///
/// # Errors
///
/// Returns [`ModelError`] if `side` is zero.
pub fn sphere_phantom(side: usize) -> Result<ArrayPayload, ModelError> {
    if side == 0 {
        return Err(ModelError::validation("Phantom side must be at least 1"));
    }

    let center = (side as f64 - 1.0) / 2.0;
    let radius = side as f64 / 3.0;

    let mut values = Vec::with_capacity(side.saturating_mul(side).saturating_mul(side));
    for z in 0..side {
        for y in 0..side {
            for x in 0..side {
                let distance = [z, y, x]
                    .iter()
                    .map(|&axis| (axis as f64 - center).powi(2))
                    .sum::<f64>()
                    .sqrt();
                values.push(if distance <= radius { TISSUE_HU } else { AIR_HU });
            }
        }
    }

    let payload = ArrayPayload::from_elements([1, side, side, side, 1], &values)?;
    payload.validate()?;
    Ok(payload)
}

/// Show a phantom of `side`³ voxels in `session`, then idle until `shutdown` completes.
///
/// The viewer page is awaited without a bound, since a person has to open it.
/// `shutdown` completing at any point ends the demo cleanly.
///
/// # Errors
///
/// Returns [`TunnelvisionError`] if the page rejects the session or the volume
/// cannot be built or sent.
pub async fn stream_phantom<S>(
    context: &SessionContext,
    session: &ViewSession,
    side: usize,
    shutdown: S,
) -> Result<(), TunnelvisionError>
where
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let mut handshake = context.registry().register(session.token());
    tokio::select! {
        connected = handshake.wait() => {
            if !connected? {
                return Err(TunnelvisionError::app(format!(
                    "Viewer page for {} reported connected=false",
                    session.token()
                )));
            }
        }
        () = &mut shutdown => return Ok(()),
    }

    let volume = sphere_phantom(side)
        .map_err(|e| TunnelvisionError::app(format!("Failed to build demo volume: {e}")))?;
    session.imshow(
        &volume,
        ImshowOptions {
            config: Window::SoftTissue.config(),
            ..ImshowOptions::default()
        },
    )?;

    tokio::select! {
        sent = session.flush() => {
            sent?;
            info!("Volume delivered to {}", session.uri());
        }
        () = &mut shutdown => return Ok(()),
    }

    shutdown.await;
    Ok(())
}
