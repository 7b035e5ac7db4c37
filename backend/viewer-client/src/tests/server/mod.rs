mod health;
mod port;
mod relay;
mod supervisor;
