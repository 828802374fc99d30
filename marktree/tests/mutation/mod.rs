mod structured;
mod suggestions;
