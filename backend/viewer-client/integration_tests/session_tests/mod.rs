mod context;
mod helpers;
mod view;
