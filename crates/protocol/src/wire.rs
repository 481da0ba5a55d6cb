//! Wire-Format fuer TCP-Verbindungen zum Rendezvous-Server
//!
//! Frame-basiertes Protokoll: Length(u32 big-endian) + JSON-Payload.
//!
//! ## Frame-Format
//!
//! ```text
//! +--------+--------+--------+--------+----...----+
//! | Laenge (u32 BE) | 4 Bytes        | Payload    |
//! +--------+--------+--------+--------+----...----+
//! ```
//!
//! Die Laenge gibt die Anzahl der Payload-Bytes an (ohne die 4 Laengen-Bytes).
//! Maximale Frame-Groesse ist konfigurierbar (Standard: 256 KB).

use bytes::{Buf, BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use std::marker::PhantomData;
use tokio_util::codec::{Decoder, Encoder};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Frame-Groesse (256 KB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 256 * 1024;

/// Groesse des Laengen-Felds in Bytes
pub const LENGTH_FIELD_SIZE: usize = 4;

// ---------------------------------------------------------------------------
// FrameCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer frame-basierte TCP-Verbindungen
///
/// `Ein` ist der empfangene, `Aus` der gesendete Nachrichtentyp. Der
/// Server nutzt `FrameCodec<ClientNachricht, ServerNachricht>`, der Client
/// die umgekehrte Richtung.
///
/// # Beispiel
///
/// ```rust,no_run
/// use tokio_util::codec::Framed;
/// use tuschel_protocol::{ClientNachricht, FrameCodec, ServerNachricht};
///
/// // let stream = TcpStream::connect(...).await?;
/// // let framed = Framed::new(stream, FrameCodec::<ServerNachricht, ClientNachricht>::new());
/// ```
#[derive(Debug)]
pub struct FrameCodec<Ein, Aus> {
    /// Maximale erlaubte Frame-Groesse in Bytes
    max_frame_size: usize,
    _typen: PhantomData<fn(Aus) -> Ein>,
}

impl<Ein, Aus> FrameCodec<Ein, Aus> {
    /// Erstellt einen neuen `FrameCodec` mit Standard-Limits
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Erstellt einen `FrameCodec` mit benutzerdefinierter maximaler Frame-Groesse
    pub fn with_max_size(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            _typen: PhantomData,
        }
    }

    /// Gibt die konfigurierte maximale Frame-Groesse zurueck
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl<Ein, Aus> Default for FrameCodec<Ein, Aus> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Ein, Aus> Clone for FrameCodec<Ein, Aus> {
    fn clone(&self) -> Self {
        Self::with_max_size(self.max_frame_size)
    }
}

// ---------------------------------------------------------------------------
// Decoder-Implementierung
// ---------------------------------------------------------------------------

impl<Ein: DeserializeOwned, Aus> Decoder for FrameCodec<Ein, Aus> {
    type Item = Ein;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Warte auf mindestens 4 Bytes fuer das Laengen-Feld
        if src.len() < LENGTH_FIELD_SIZE {
            return Ok(None);
        }

        let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;

        if length > self.max_frame_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Frame zu gross: {} Bytes (Maximum: {} Bytes)",
                    length, self.max_frame_size
                ),
            ));
        }

        let total_size = LENGTH_FIELD_SIZE + length;
        if src.len() < total_size {
            // Speicher vorbelegen um Reallocations zu vermeiden
            src.reserve(total_size - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_FIELD_SIZE);
        let payload = src.split_to(length);

        let message: Ein = serde_json::from_slice(&payload).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("JSON-Deserialisierung fehlgeschlagen: {}", e),
            )
        })?;

        Ok(Some(message))
    }
}

// ---------------------------------------------------------------------------
// Encoder-Implementierung
// ---------------------------------------------------------------------------

impl<Ein, Aus: Serialize> Encoder<Aus> for FrameCodec<Ein, Aus> {
    type Error = io::Error;

    fn encode(&mut self, item: Aus, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_vec(&item).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("JSON-Serialisierung fehlgeschlagen: {}", e),
            )
        })?;

        if json.len() > self.max_frame_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Nachricht zu gross: {} Bytes (Maximum: {} Bytes)",
                    json.len(),
                    self.max_frame_size
                ),
            ));
        }

        dst.reserve(LENGTH_FIELD_SIZE + json.len());
        dst.put_u32(json.len() as u32);
        dst.put_slice(&json);

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendezvous::{ClientNachricht, ServerNachricht};
    use tuschel_core::PeerId;

    type ServerCodec = FrameCodec<ClientNachricht, ServerNachricht>;
    type ClientCodec = FrameCodec<ServerNachricht, ClientNachricht>;

    fn hello() -> ClientNachricht {
        ClientNachricht::Hello { wunsch_id: None }
    }

    #[test]
    fn client_zu_server_ueber_codec() {
        let mut client = ClientCodec::new();
        let mut server = ServerCodec::new();

        let mut buf = BytesMut::new();
        client.encode(hello(), &mut buf).unwrap();

        let payload_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(buf.len(), LENGTH_FIELD_SIZE + payload_len);

        let decoded = server
            .decode(&mut buf)
            .unwrap()
            .expect("Muss eine Nachricht enthalten");
        assert_eq!(decoded, hello());
    }

    #[test]
    fn frame_codec_unvollstaendiger_frame() {
        let mut client = ClientCodec::new();
        let mut server = ServerCodec::new();

        let mut buf = BytesMut::new();
        client.encode(hello(), &mut buf).unwrap();

        // Nur die Haelfte der Bytes behalten
        let half = buf.len() / 2;
        let mut partial = buf.split_to(half);

        let result = server.decode(&mut partial).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn frame_codec_zu_wenig_bytes_fuer_laengenfeld() {
        let mut codec = ServerCodec::new();
        let mut buf = BytesMut::from(&[0x00, 0x00][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn frame_codec_ablehnung_zu_grosser_frame() {
        let mut codec = ServerCodec::with_max_size(100);

        let mut buf = BytesMut::new();
        buf.put_u32(200);
        buf.put_slice(&[b'x'; 200]);

        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn frame_codec_ablehnung_beim_encode_zu_grosse_nachricht() {
        let mut codec = ServerCodec::with_max_size(10);
        let msg = ServerNachricht::Welcome {
            peer_id: PeerId::new(),
        };
        let mut buf = BytesMut::new();
        assert!(codec.encode(msg, &mut buf).is_err());
    }

    #[test]
    fn frame_codec_mehrere_nachrichten_im_buffer() {
        let mut server = ServerCodec::new();
        let mut client = ClientCodec::new();
        let mut buf = BytesMut::new();

        let ids: Vec<PeerId> = (0..3).map(|_| PeerId::new()).collect();
        for id in &ids {
            server
                .encode(ServerNachricht::Welcome { peer_id: *id }, &mut buf)
                .unwrap();
        }

        for id in &ids {
            let msg = client.decode(&mut buf).unwrap().expect("Nachricht erwartet");
            assert_eq!(msg, ServerNachricht::Welcome { peer_id: *id });
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn ungueltiges_json_ist_fehler() {
        let mut codec = ServerCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u32(3);
        buf.put_slice(b"{x}");
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn frame_codec_default_max_size() {
        let codec = ServerCodec::default();
        assert_eq!(codec.max_frame_size(), DEFAULT_MAX_FRAME_SIZE);
    }
}
