mod handshake;
mod supervisor;
