pub mod deepgram;
