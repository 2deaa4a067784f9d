//! Range server - answers frame-range requests
//!
//! Frames are published individually on the requester's response topic
//! (`filter || peer_id`) so the peer can start verifying as soon as the
//! first frame lands. The walk follows the finalized chain while one exists,
//! then fans out breadth-first over candidate branches in ascending distance
//! order. At most [`MAX_RANGE_SPAN`] frames leave per request.

use tracing::{debug, error, info};

use cadence_crypto::FrameProver;
use cadence_model::{ClockFrame, ClockFramesRequest, ClockFramesResponse, Payload, PeerId};
use cadence_pubsub::PubSub;
use cadence_store::StoreError;

use crate::engine::{DataClockEngine, MAX_RANGE_SPAN};
use crate::error::EngineError;

impl<P: FrameProver, PS: PubSub> DataClockEngine<P, PS> {
    pub(crate) async fn handle_clock_frames_request(
        &self,
        peer_id: &PeerId,
        address: &[u8],
        request: ClockFramesRequest,
    ) -> Result<(), EngineError> {
        if *peer_id == self.pubsub.peer_id() {
            return Ok(());
        }

        // Idempotent: the requester's topic doubles as our sync channel
        // towards them.
        let response_topic = self.response_topic(peer_id);
        self.subscribe_topic(response_topic.clone())?;

        info!(
            peer_id = %peer_id,
            address = %hex::encode(address),
            from_frame_number = request.from_frame_number,
            to_frame_number = request.to_frame_number,
            "received clock frame request",
        );

        let from = request.from_frame_number;
        let base = match self.clock_store.get_data_clock_frame(&request.filter, from) {
            Ok((frame, _)) => frame,
            Err(StoreError::NotFound) => {
                debug!(
                    peer_id = %peer_id,
                    frame_number = from,
                    "peer asked for undiscovered frame",
                );
                // (0, 0) is the sentinel for "nothing here", never a range.
                self.publish_payload(
                    &response_topic,
                    Payload::ClockFramesResponse(ClockFramesResponse {
                        filter: request.filter,
                        from_frame_number: 0,
                        to_frame_number: 0,
                        clock_frames: Vec::new(),
                    }),
                )
                .await?;
                return Ok(());
            }
            Err(err) => {
                error!(
                    peer_id = %peer_id,
                    frame_number = from,
                    error = %err,
                    "peer asked for frame that returned error",
                );
                return Err(err.into());
            }
        };

        let mut to = request.to_frame_number;
        if to == 0 || to < from || to - from > MAX_RANGE_SPAN {
            to = from.saturating_add(MAX_RANGE_SPAN - 1);
        }

        let mut published: u64 = 0;
        self.publish_frame(&response_topic, &base, &mut published)
            .await?;

        let mut search_span = vec![base];
        let mut current: u64 = 1;
        let mut no_more_finalized = false;

        while !search_span.is_empty() && from.saturating_add(current) <= to {
            info!(
                peer_id = %peer_id,
                from,
                to,
                current_number = current,
                "scanning frames to add to response",
            );

            let mut next_span = Vec::new();
            for span_frame in &search_span {
                let selector = span_frame.selector().to_bytes_be();
                let next_height = span_frame.frame_number.saturating_add(1);

                if !no_more_finalized {
                    match self
                        .clock_store
                        .get_data_clock_frame(&span_frame.filter, next_height)
                    {
                        Ok((frame, _)) => {
                            if published >= MAX_RANGE_SPAN {
                                return Ok(());
                            }
                            self.publish_frame(&response_topic, &frame, &mut published)
                                .await?;
                            next_span.push(frame);
                        }
                        Err(StoreError::NotFound) => {
                            no_more_finalized = true;
                        }
                        Err(err) => {
                            error!(
                                peer_id = %peer_id,
                                frame_number = next_height,
                                error = %err,
                                "fetching clock frame produced error",
                            );
                            return Err(err.into());
                        }
                    }
                }

                if no_more_finalized {
                    let mut iter = self.clock_store.range_candidate_data_clock_frames(
                        &span_frame.filter,
                        &selector,
                        next_height,
                    )?;

                    // Dropping the iterator on the error paths below still
                    // releases its snapshot.
                    iter.first()?;
                    while iter.valid() {
                        let frame = iter.value()?.clone();
                        if published >= MAX_RANGE_SPAN {
                            iter.close()?;
                            return Ok(());
                        }
                        self.publish_frame(&response_topic, &frame, &mut published)
                            .await?;
                        next_span.push(frame);
                        iter.next();
                    }
                    iter.close()?;
                }
            }
            current += 1;
            search_span = next_span;
        }

        Ok(())
    }

    async fn publish_frame(
        &self,
        topic: &[u8],
        frame: &ClockFrame,
        published: &mut u64,
    ) -> Result<(), EngineError> {
        self.publish_payload(topic, Payload::ClockFrame(frame.clone()))
            .await?;
        *published += 1;
        Ok(())
    }
}
